//! The manifest store and its box-tree mapping.

use bytes::Bytes;

use brocade_boxes::{BoxNode, Payload, fourcc, jpeg, jumbf};
use brocade_codec::cbor::{self, CborWriteOptions, CborWriter};
use brocade_jose::CoseSign1;
use brocade_node::Node;

use crate::assertion::Assertion;
use crate::error::{C2paError, Result};

/// Label of the store superbox
pub const STORE_LABEL: &str = "c2pa";
/// Label of the assertion store inside a manifest
pub const ASSERTIONS_LABEL: &str = "c2pa.assertions";
/// Label of the claim superbox
pub const CLAIM_LABEL: &str = "c2pa.claim";
/// Label of the signature superbox
pub const SIGNATURE_LABEL: &str = "c2pa.signature";

/// One manifest: assertions, a claim and its signature
#[derive(Debug)]
pub struct Manifest {
    /// Store-unique label, conventionally a `urn:uuid:` form
    pub label: String,
    /// Assertions in insertion order
    pub assertions: Vec<Assertion>,
    claims: Vec<Node>,
    signatures: Vec<CoseSign1>,
}

impl Manifest {
    /// Fresh manifest with an empty claim
    pub fn new(label: impl Into<String>) -> Manifest {
        Manifest {
            label: label.into(),
            assertions: Vec::new(),
            claims: vec![Node::map()],
            signatures: Vec::new(),
        }
    }

    /// Append an assertion
    pub fn add_assertion(&mut self, assertion: Assertion) {
        self.assertions.push(assertion);
    }

    /// Assertion by label
    pub fn assertion(&self, label: &str) -> Option<&Assertion> {
        self.assertions.iter().find(|a| a.label == label)
    }

    /// The claim map (handle; mutations are visible in the manifest)
    pub fn claim(&self) -> Option<Node> {
        self.claims.first().cloned()
    }

    /// Number of claim boxes seen (exactly one is valid)
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    /// The claim signature
    pub fn signature(&self) -> Option<&CoseSign1> {
        self.signatures.first()
    }

    /// Number of signature boxes seen (exactly one is valid)
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub(crate) fn set_signature(&mut self, signature: CoseSign1) {
        self.signatures = vec![signature];
    }

    /// JUMBF URI of one of this manifest's assertions
    pub fn assertion_uri(&self, label: &str) -> String {
        format!(
            "self#jumbf=c2pa/{}/{}/{}",
            self.label, ASSERTIONS_LABEL, label
        )
    }

    /// JUMBF URI of this manifest's signature
    pub fn signature_uri(&self) -> String {
        format!("self#jumbf=c2pa/{}/{}", self.label, SIGNATURE_LABEL)
    }

    /// The manifest as a `c2ma` superbox
    pub fn to_box(&self) -> Result<BoxNode> {
        let assertion_store = jumbf::superbox(
            jumbf::DescriptionBox::labelled(jumbf::type_uuid(b"c2as"), ASSERTIONS_LABEL),
            self.assertions.iter().map(Assertion::to_box).collect(),
        );
        let mut children = vec![assertion_store];
        for claim in &self.claims {
            children.push(jumbf::superbox(
                jumbf::DescriptionBox::labelled(jumbf::type_uuid(b"c2cl"), CLAIM_LABEL),
                vec![BoxNode {
                    kind: fourcc::CBOR,
                    payload: Payload::Cbor(claim.duplicate()),
                    padding: Bytes::new(),
                }],
            ));
        }
        for signature in &self.signatures {
            let wire = signature.to_vec()?;
            children.push(jumbf::superbox(
                jumbf::DescriptionBox::labelled(jumbf::type_uuid(b"c2cs"), SIGNATURE_LABEL),
                vec![BoxNode {
                    kind: fourcc::CBOR,
                    payload: Payload::Cbor(cbor::from_slice(&wire)?),
                    padding: Bytes::new(),
                }],
            ));
        }
        Ok(jumbf::superbox(
            jumbf::DescriptionBox::labelled(jumbf::type_uuid(b"c2ma"), &self.label),
            children,
        ))
    }

    /// Read a manifest back from its superbox
    pub fn from_box(node: &BoxNode) -> Result<Manifest> {
        let label = jumbf::label(node).ok_or(C2paError::Structure("manifest has no label"))?;
        let mut manifest = Manifest {
            label,
            assertions: Vec::new(),
            claims: Vec::new(),
            signatures: Vec::new(),
        };
        for child in node.children().iter().skip(1) {
            match jumbf::label(child).as_deref() {
                Some(ASSERTIONS_LABEL) => {
                    for abox in child.children().iter().skip(1) {
                        if let Some(assertion) = Assertion::from_box(abox) {
                            manifest.assertions.push(assertion);
                        }
                    }
                }
                Some(CLAIM_LABEL) => {
                    if let Some(BoxNode {
                        payload: Payload::Cbor(claim),
                        ..
                    }) = child.children().get(1)
                    {
                        manifest.claims.push(claim.duplicate());
                    }
                }
                Some(SIGNATURE_LABEL) => {
                    if let Some(content) = child.children().get(1) {
                        let bytes = signature_wire_bytes(content)?;
                        manifest.signatures.push(CoseSign1::from_slice(&bytes)?);
                    }
                }
                _ => {}
            }
        }
        Ok(manifest)
    }
}

/// Re-encode a parsed signature content box to its wire bytes
fn signature_wire_bytes(content: &BoxNode) -> Result<Vec<u8>> {
    match &content.payload {
        Payload::Cbor(node) => {
            let mut writer = CborWriter::new(CborWriteOptions::builder().int_keys(true).build());
            writer.write_node(node)?;
            Ok(writer.into_bytes())
        }
        Payload::Data(b) | Payload::Raw(b) => Ok(b.to_vec()),
        _ => Err(C2paError::Structure("signature content box is not CBOR")),
    }
}

/// A C2PA store: one or more manifests; the last is active
#[derive(Debug, Default)]
pub struct Store {
    /// Manifests in insertion order
    pub manifests: Vec<Manifest>,
}

impl Store {
    /// Empty store
    pub fn new() -> Store {
        Store::default()
    }

    /// Append a manifest; it becomes the active one
    pub fn add_manifest(&mut self, manifest: Manifest) {
        self.manifests.push(manifest);
    }

    /// The manifest whose signature covers the asset
    pub fn active_manifest(&self) -> Option<&Manifest> {
        self.manifests.last()
    }

    /// Mutable access to the active manifest
    pub fn active_manifest_mut(&mut self) -> Option<&mut Manifest> {
        self.manifests.last_mut()
    }

    /// Manifest by label
    pub fn manifest(&self, label: &str) -> Option<&Manifest> {
        self.manifests.iter().find(|m| m.label == label)
    }

    /// The store as its `c2pa` superbox
    pub fn to_box(&self) -> Result<BoxNode> {
        let manifests = self
            .manifests
            .iter()
            .map(Manifest::to_box)
            .collect::<Result<Vec<_>>>()?;
        Ok(jumbf::superbox(
            jumbf::DescriptionBox::labelled(jumbf::type_uuid(b"c2pa"), STORE_LABEL),
            manifests,
        ))
    }

    /// Read a store from its superbox
    pub fn from_box(node: &BoxNode) -> Result<Store> {
        if node.kind != fourcc::JUMB
            || jumbf::label(node).as_deref() != Some(STORE_LABEL)
        {
            return Err(C2paError::Structure("root is not a c2pa store superbox"));
        }
        let mut store = Store::new();
        for child in node.children().iter().skip(1) {
            store.manifests.push(Manifest::from_box(child)?);
        }
        Ok(store)
    }

    /// Encoded store bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_box()?.to_bytes()?)
    }

    /// Parse encoded store bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Store> {
        let boxes = brocade_boxes::read_boxes(bytes)?;
        let root = boxes
            .first()
            .ok_or(C2paError::Structure("no boxes in input"))?;
        Store::from_box(root)
    }

    /// Embed into a JPEG via APP11 segments
    pub fn embed_in_jpeg(&self, jpeg_bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(jpeg::embed_store(jpeg_bytes, &self.to_bytes()?)?)
    }

    /// Extract from a JPEG, if present
    pub fn from_jpeg(jpeg_bytes: &[u8]) -> Result<Option<Store>> {
        match jpeg::extract_store(jpeg_bytes)? {
            Some(bytes) => Ok(Some(Store::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// Resolve a JUMBF URI of the `self#jumbf=c2pa/...` family against a
/// store. Returns the manifest label and remaining path.
pub(crate) fn split_uri(uri: &str) -> Option<(&str, &str)> {
    let path = uri.strip_prefix("self#jumbf=")?;
    let path = path.strip_prefix("c2pa/").unwrap_or(path);
    let (manifest, rest) = path.split_once('/')?;
    Some((manifest, rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::LABEL_ACTIONS;

    fn sample_store() -> Store {
        let mut manifest = Manifest::new("urn:uuid:f81d4fae-7dec-11d0-a765-00a0c91e6bf6");
        let actions = Node::map();
        actions.put("actions[0].action", "c2pa.created").unwrap();
        manifest.add_assertion(Assertion::cbor(LABEL_ACTIONS, actions));
        manifest.claim().unwrap().put("dc:format", "image/jpeg").unwrap();
        let mut store = Store::new();
        store.add_manifest(manifest);
        store
    }

    #[test]
    fn store_round_trip() {
        let store = sample_store();
        let bytes = store.to_bytes().expect("encode");
        let back = Store::from_bytes(&bytes).expect("decode");
        assert_eq!(back.manifests.len(), 1);
        let manifest = back.active_manifest().unwrap();
        assert_eq!(manifest.assertions.len(), 1);
        assert_eq!(manifest.claim_count(), 1);
        assert_eq!(
            manifest
                .claim()
                .unwrap()
                .get("dc:format")
                .unwrap()
                .string_value()
                .unwrap(),
            "image/jpeg"
        );
        assert_eq!(
            manifest
                .assertion(LABEL_ACTIONS)
                .unwrap()
                .value()
                .unwrap()
                .get("actions[0].action")
                .unwrap()
                .string_value()
                .unwrap(),
            "c2pa.created"
        );
    }

    #[test]
    fn active_manifest_is_last() {
        let mut store = Store::new();
        store.add_manifest(Manifest::new("urn:uuid:first"));
        store.add_manifest(Manifest::new("urn:uuid:second"));
        assert_eq!(store.active_manifest().unwrap().label, "urn:uuid:second");
    }

    #[test]
    fn uris_and_splitting() {
        let manifest = Manifest::new("urn:uuid:x");
        let uri = manifest.assertion_uri("c2pa.actions");
        assert_eq!(
            uri,
            "self#jumbf=c2pa/urn:uuid:x/c2pa.assertions/c2pa.actions"
        );
        let (m, rest) = split_uri(&uri).unwrap();
        assert_eq!(m, "urn:uuid:x");
        assert_eq!(rest, "c2pa.assertions/c2pa.actions");
        assert_eq!(
            split_uri(&manifest.signature_uri()).unwrap().1,
            "c2pa.signature"
        );
    }

    #[test]
    fn non_store_rejected() {
        assert!(Store::from_bytes(b"\0\0\0\x08free").is_err());
    }
}
