//! Thin JWT layer over compact JWS: the payload is a JSON claims map
//! exposed as a value tree.

use brocade_node::Node;

use crate::error::{JoseError, Result};
use crate::jwk::Jwk;
use crate::jws::{Jws, JwsHeader};

/// A JSON Web Token
#[derive(Debug, Clone)]
pub struct Jwt {
    /// The underlying signature envelope
    pub jws: Jws,
}

impl Jwt {
    /// Parse a compact token
    pub fn parse(token: &str) -> Result<Jwt> {
        Ok(Jwt {
            jws: Jws::parse_compact(token)?,
        })
    }

    /// Sign a claims map. The header gets `typ: "JWT"` and an `alg`
    /// inferred from the key unless a header is supplied.
    pub fn sign(claims: &Node, header: Option<JwsHeader>, key: &Jwk) -> Result<Jwt> {
        let header = header.unwrap_or(JwsHeader {
            typ: Some("JWT".into()),
            ..JwsHeader::default()
        });
        let payload = brocade_codec::json::to_string(claims)?;
        Ok(Jwt {
            jws: Jws::sign(payload.into_bytes(), Some(header), key)?,
        })
    }

    /// The decoded claims map
    pub fn claims(&self) -> Result<Node> {
        let node = brocade_codec::json::from_bytes(&self.jws.payload)?;
        if node.type_name() != "map" {
            return Err(JoseError::malformed("JWT", "claims are not an object"));
        }
        Ok(node)
    }

    /// Verify the signature
    pub fn verify(&self, key: Option<&Jwk>) -> Result<()> {
        self.jws.verify(key)
    }

    /// The compact wire form
    pub fn to_compact(&self) -> String {
        self.jws.to_compact()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alg::Algorithm;

    #[test]
    fn hs256_sign_verify_cycle() {
        // header {"alg":"HS256","typ":"JWT"} over a small claims map,
        // secret "secret": verify, re-sign, verify again
        let key = Jwk::from_oct(b"secret");
        let claims = Node::map();
        claims.put("sub", "1234567890").unwrap();
        claims.put("name", "John Doe").unwrap();
        claims.put("admin", true).unwrap();

        let jwt = Jwt::sign(&claims, None, &key).expect("sign");
        assert_eq!(jwt.jws.header.alg, Some(Algorithm::Hs256));
        assert_eq!(jwt.jws.header.typ.as_deref(), Some("JWT"));
        jwt.verify(Some(&key)).expect("verify");

        let token = jwt.to_compact();
        let parsed = Jwt::parse(&token).expect("parse");
        parsed.verify(Some(&key)).expect("verify parsed");
        assert_eq!(
            parsed.claims().unwrap().get("name").unwrap().string_value().unwrap(),
            "John Doe"
        );

        // sign again with the same secret: still verifies
        let again = Jwt::sign(&parsed.claims().unwrap(), None, &key).expect("re-sign");
        again.verify(Some(&key)).expect("verify re-signed");
    }

    #[test]
    fn claims_must_be_an_object() {
        let key = Jwk::from_oct(b"secret");
        let jws = Jws::sign(&b"[1,2,3]"[..], None, &key).unwrap();
        let jwt = Jwt { jws };
        assert!(jwt.claims().is_err());
    }

    #[test]
    fn wrong_secret_fails() {
        let key = Jwk::from_oct(b"secret");
        let claims = Node::map();
        claims.put("ok", true).unwrap();
        let token = Jwt::sign(&claims, None, &key).unwrap().to_compact();
        let parsed = Jwt::parse(&token).unwrap();
        assert!(parsed.verify(Some(&Jwk::from_oct(b"wrong"))).is_err());
    }
}
