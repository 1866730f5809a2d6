//! SML parameter trees.
//!
//! A tree node is `(parameter_name, parameter_value, child_list)`. A leaf
//! carries a value and no children; an interior node carries children and
//! no value. Bare markers (neither value nor children) appear in requests
//! that merely address a parameter.

use super::value::{Decoder, Encoder, NOT_SET, SmlValue};
use super::{MAX_TREE_DEPTH, SmlError};
use crate::obis::Obis;

/// Choice tag selecting a plain value in the parameter-value choice.
const PROC_PAR_VALUE: u8 = 1;
/// Choice tag selecting an SML_Time in the parameter-value choice.
const PROC_PAR_TIME: u8 = 4;

/// Recursive SML parameter tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmlTree {
    /// Parameter name.
    pub name: Obis,
    /// Value of a leaf node.
    pub value: Option<SmlValue>,
    /// Children of an interior node.
    pub children: Vec<SmlTree>,
}

impl SmlTree {
    /// Leaf node carrying a value.
    #[must_use]
    pub fn leaf(name: Obis, value: SmlValue) -> Self {
        Self { name, value: Some(value), children: Vec::new() }
    }

    /// Interior node carrying children.
    #[must_use]
    pub fn node(name: Obis, children: Vec<SmlTree>) -> Self {
        Self { name, value: None, children }
    }

    /// Bare marker node addressing a parameter without content.
    #[must_use]
    pub fn empty(name: Obis) -> Self {
        Self { name, value: None, children: Vec::new() }
    }

    /// Descend along `path`, matching one child name per step.
    #[must_use]
    pub fn find(&self, path: &[Obis]) -> Option<&SmlTree> {
        let (head, rest) = path.split_first()?;
        let child = self.children.iter().find(|c| c.name == *head)?;
        if rest.is_empty() { Some(child) } else { child.find(rest) }
    }

    /// Leaf value below this node addressed by `path`.
    #[must_use]
    pub fn find_value(&self, path: &[Obis]) -> Option<&SmlValue> {
        self.find(path)?.value.as_ref()
    }

    /// Encode as the 3-element parameter-tree list.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.list(3);
        enc.octet(self.name.as_bytes());
        match &self.value {
            Some(SmlValue::Timestamp(secs)) => {
                enc.list(2);
                enc.u8(PROC_PAR_TIME);
                enc.time_opt(Some(*secs));
            },
            Some(value) => {
                enc.list(2);
                enc.u8(PROC_PAR_VALUE);
                enc.value(value);
            },
            None => enc.none(),
        }
        if self.children.is_empty() {
            enc.none();
        } else {
            enc.list(self.children.len());
            for child in &self.children {
                child.encode(enc);
            }
        }
    }

    /// Decode a parameter tree.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self, SmlError> {
        Self::decode_depth(dec, 0)
    }

    fn decode_depth(dec: &mut Decoder<'_>, depth: usize) -> Result<Self, SmlError> {
        if depth >= MAX_TREE_DEPTH {
            return Err(SmlError::DepthExceeded);
        }
        dec.list_of(3)?;
        let name = dec
            .octet()?
            .and_then(|b| Obis::from_slice(&b))
            .ok_or(SmlError::Malformed("tree node without OBIS name"))?;

        let value = if dec.peek() == Some(NOT_SET) {
            dec.value_opt()?; // consume the marker
            None
        } else {
            dec.list_of(2)?;
            let tag = dec.u8()?;
            match tag {
                PROC_PAR_VALUE => Some(dec.value()?),
                PROC_PAR_TIME => dec.time()?.map(SmlValue::Timestamp),
                _ => return Err(SmlError::Malformed("unknown parameter-value choice")),
            }
        };

        let children = if dec.peek() == Some(NOT_SET) {
            dec.value_opt()?; // consume the marker
            Vec::new()
        } else {
            let count = dec.list()?;
            let mut children = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                children.push(Self::decode_depth(dec, depth + 1)?);
            }
            children
        };

        Ok(Self { name, value, children })
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use proptest::prelude::*;

    use super::*;
    use crate::obis::codes;

    fn round_trip(tree: &SmlTree) -> SmlTree {
        let mut enc = Encoder::new();
        tree.encode(&mut enc);
        let wire = enc.into_bytes();
        let mut dec = Decoder::new(&wire);
        SmlTree::decode(&mut dec).unwrap()
    }

    #[test]
    fn leaf_round_trip() {
        let tree = SmlTree::leaf(codes::DATA_MANUFACTURER, SmlValue::string("solosTec"));
        assert_eq!(round_trip(&tree), tree);
    }

    #[test]
    fn nested_lookup() {
        let tree = SmlTree::node(
            codes::ROOT_DEVICE_IDENT,
            vec![
                SmlTree::leaf(codes::DATA_MANUFACTURER, SmlValue::string("acme")),
                SmlTree::node(
                    codes::ROOT_FIRMWARE,
                    vec![SmlTree::leaf(codes::DATA_FIRMWARE_VERSION, SmlValue::string("1.2"))],
                ),
            ],
        );
        assert_eq!(
            tree.find_value(&[codes::ROOT_FIRMWARE, codes::DATA_FIRMWARE_VERSION]),
            Some(&SmlValue::string("1.2"))
        );
        assert_eq!(tree.find(&[codes::SERIAL_NR]), None);
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut tree = SmlTree::leaf(codes::SERIAL_NR, SmlValue::U8(1));
        for _ in 0..MAX_TREE_DEPTH {
            tree = SmlTree::node(codes::ROOT_DEVICE_IDENT, vec![tree]);
        }
        let mut enc = Encoder::new();
        tree.encode(&mut enc);
        let wire = enc.into_bytes();
        let mut dec = Decoder::new(&wire);
        assert_eq!(SmlTree::decode(&mut dec), Err(SmlError::DepthExceeded));
    }

    fn arb_tree() -> impl Strategy<Value = SmlTree> {
        let leaf = (any::<[u8; 6]>(), proptest::collection::vec(any::<u8>(), 1..12)).prop_map(
            |(name, octets)| {
                SmlTree::leaf(Obis::from_array(name), SmlValue::Octet(Bytes::from(octets)))
            },
        );
        leaf.prop_recursive(7, 64, 4, |inner| {
            (any::<[u8; 6]>(), proptest::collection::vec(inner, 1..4)).prop_map(
                |(name, children)| SmlTree::node(Obis::from_array(name), children),
            )
        })
    }

    proptest! {
        #[test]
        fn tree_round_trip(tree in arb_tree()) {
            prop_assert_eq!(round_trip(&tree), tree);
        }
    }
}
