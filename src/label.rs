//! Resolution of stack/channel labels to array axis indices

use crate::error::{Result, VsrError};
use crate::metadata::{ChannelDescriptor, StackDescriptor};
use crate::types::LabelKind;
use std::collections::HashSet;

/// Label -> index lookup for the stacks and channels of one image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelIndex {
    channels: Vec<(String, u32)>,
    stacks: Vec<(String, u32)>,
}

impl LabelIndex {
    /// Build an index from descriptor lists, rejecting duplicate labels
    pub fn new(channels: &[ChannelDescriptor], stacks: &[StackDescriptor]) -> Result<Self> {
        let channels: Vec<(String, u32)> = channels
            .iter()
            .map(|c| (c.wavelength.clone(), c.index))
            .collect();
        let stacks: Vec<(String, u32)> = stacks.iter().map(|s| (s.label.clone(), s.index)).collect();

        check_unique(LabelKind::Channel, &channels)?;
        check_unique(LabelKind::Stack, &stacks)?;

        Ok(Self { channels, stacks })
    }

    fn entries(&self, kind: LabelKind) -> &[(String, u32)] {
        match kind {
            LabelKind::Stack => &self.stacks,
            LabelKind::Channel => &self.channels,
        }
    }

    /// Resolve a label to its axis index
    pub fn resolve(&self, kind: LabelKind, label: &str) -> Result<u32> {
        self.entries(kind)
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, index)| *index)
            .ok_or_else(|| VsrError::UnknownLabel {
                kind: kind.to_string(),
                label: label.to_string(),
                valid: self.labels(kind),
            })
    }

    /// Label declared for an axis index
    pub fn label_of(&self, kind: LabelKind, index: u32) -> Option<&str> {
        self.entries(kind)
            .iter()
            .find(|(_, i)| *i == index)
            .map(|(l, _)| l.as_str())
    }

    /// Labels in declaration order
    pub fn labels(&self, kind: LabelKind) -> Vec<String> {
        self.entries(kind).iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn len(&self, kind: LabelKind) -> usize {
        self.entries(kind).len()
    }

    pub fn is_empty(&self, kind: LabelKind) -> bool {
        self.entries(kind).is_empty()
    }

    /// Check that the indices of `kind` are exactly `0..len` in some order
    pub fn validate_dense(&self, kind: LabelKind) -> Result<()> {
        let entries = self.entries(kind);
        let mut seen = vec![false; entries.len()];
        for (label, index) in entries {
            match seen.get_mut(*index as usize) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(VsrError::Validation(format!(
                        "{} '{}' has index {}, indices must be dense and unique in 0..{}",
                        kind,
                        label,
                        index,
                        entries.len()
                    )))
                }
            }
        }
        Ok(())
    }
}

fn check_unique(kind: LabelKind, entries: &[(String, u32)]) -> Result<()> {
    let mut seen = HashSet::new();
    for (label, _) in entries {
        if !seen.insert(label.as_str()) {
            return Err(VsrError::Validation(format!(
                "Duplicate {} label '{}'",
                kind, label
            )));
        }
    }
    Ok(())
}
