//! Subscription to binding table
//!
//! Flat `u32` layout, indexed relative to the start of the table:
//!
//! ```text
//! [offset of subscription 0] .. [offset of subscription N-1]
//! [count][binding]..           (at each offset)
//! ```

use crate::error::{BytecodeError, Result};

/// For each subscription, the bindings to re-run when it fires
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalTable {
    words: Vec<u32>,
    subscriptions: usize,
}

impl SignalTable {
    /// Invert per-binding dependency sets into per-subscription binding lists.
    ///
    /// Bindings appear in each list in the order they are given.
    pub fn build<D: AsRef<[u16]>>(subscriptions: usize, dependencies: &[D]) -> Self {
        let mut lists: Vec<Vec<u32>> = vec![Vec::new(); subscriptions];
        for (binding, deps) in dependencies.iter().enumerate() {
            for &sub in deps.as_ref() {
                if let Some(list) = lists.get_mut(sub as usize) {
                    list.push(binding as u32);
                }
            }
        }

        let mut header = Vec::with_capacity(subscriptions);
        let mut data = Vec::new();
        for list in &lists {
            header.push((subscriptions + data.len()) as u32);
            data.push(list.len() as u32);
            data.extend_from_slice(list);
        }
        header.extend(data);

        Self {
            words: header,
            subscriptions,
        }
    }

    /// Parse and validate a serialized table
    pub fn parse(bytes: &[u8], subscriptions: usize, bindings: u32) -> Result<Self> {
        if bytes.len() % 4 != 0 {
            return Err(BytecodeError::InvalidLayout(
                "signal table is not a whole number of words".into(),
            ));
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if words.len() < subscriptions {
            return Err(BytecodeError::InvalidLayout(format!(
                "signal table header needs {subscriptions} entries, has {}",
                words.len()
            )));
        }

        let table = Self {
            words,
            subscriptions,
        };
        for sub in 0..subscriptions {
            let list = table.list(sub).ok_or_else(|| {
                BytecodeError::InvalidLayout(format!("signal table entry {sub} out of range"))
            })?;
            if let Some(&bad) = list.iter().find(|&&b| b >= bindings) {
                return Err(BytecodeError::InvalidLayout(format!(
                    "subscription {sub} lists binding {bad}, program has {bindings}"
                )));
            }
        }
        Ok(table)
    }

    fn list(&self, subscription: usize) -> Option<&[u32]> {
        if subscription >= self.subscriptions {
            return None;
        }
        let offset = *self.words.get(subscription)? as usize;
        if offset < self.subscriptions {
            return None;
        }
        let count = *self.words.get(offset)? as usize;
        self.words.get(offset + 1..offset + 1 + count)
    }

    /// Bindings depending on `subscription`, in commit order
    #[inline]
    pub fn bindings(&self, subscription: u16) -> &[u32] {
        self.list(subscription as usize).unwrap_or(&[])
    }

    /// Number of subscriptions
    #[inline]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions
    }

    /// Raw words
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Serialized size in bytes
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.words.len() * 4
    }

    /// Append the serialized form
    pub fn write_to(&self, out: &mut Vec<u8>) {
        for word in &self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_inverts_dependencies() {
        // B0 -> {S0}, B1 -> {S0, S1}
        let table = SignalTable::build(2, &[vec![0u16], vec![0, 1]]);
        assert_eq!(table.bindings(0), &[0, 1]);
        assert_eq!(table.bindings(1), &[1]);
        assert_eq!(table.bindings(2), &[] as &[u32]);
        assert_eq!(table.words(), &[2, 5, 2, 0, 1, 1, 1]);
    }

    #[test]
    fn test_unused_subscription_has_empty_list() {
        let table = SignalTable::build(3, &[vec![2u16]]);
        assert!(table.bindings(0).is_empty());
        assert!(table.bindings(1).is_empty());
        assert_eq!(table.bindings(2), &[0]);
    }

    #[test]
    fn test_parse_roundtrip_and_validation() {
        let table = SignalTable::build(2, &[vec![0u16, 1], vec![1]]);
        let mut bytes = Vec::new();
        table.write_to(&mut bytes);
        assert_eq!(SignalTable::parse(&bytes, 2, 2), Ok(table));

        assert!(matches!(
            SignalTable::parse(&bytes, 2, 1),
            Err(BytecodeError::InvalidLayout(_))
        ));
        assert!(SignalTable::parse(&bytes[..3], 2, 2).is_err());
    }
}
