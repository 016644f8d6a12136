//! A tiny grow-only set CRDT used by unit tests.
//!
//! Frames are UTF-8 lines of the form `+item`; the state is the set of all
//! items seen. Merge is set union, so it is commutative and idempotent. Any
//! line that does not start with `+` makes the whole frame malformed.

use std::collections::BTreeSet;

use super::{DocEngine, DocState};
use crate::ws::error::CrdtError;

#[derive(Default)]
pub(crate) struct SetEngine;

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct SetState {
    pub items: BTreeSet<String>,
}

pub(crate) fn frame(items: &[&str]) -> Vec<u8> {
    items
        .iter()
        .map(|i| format!("+{i}"))
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

pub(crate) fn items(bytes: &[u8]) -> BTreeSet<String> {
    let mut state = SetState::default();
    state.apply(bytes).expect("valid set frame");
    state.items
}

impl DocState for SetState {
    fn apply(&mut self, update: &[u8]) -> Result<(), CrdtError> {
        let text = std::str::from_utf8(update).map_err(|e| CrdtError::Apply(e.to_string()))?;
        let mut parsed = Vec::new();
        for line in text.lines().filter(|l| !l.is_empty()) {
            match line.strip_prefix('+') {
                Some(item) => parsed.push(item.to_string()),
                None => return Err(CrdtError::Apply(format!("bad line {line:?}"))),
            }
        }
        self.items.extend(parsed);
        Ok(())
    }

    fn full_state(&self) -> Result<Vec<u8>, CrdtError> {
        let items: Vec<&str> = self.items.iter().map(String::as_str).collect();
        Ok(frame(&items))
    }
}

impl DocEngine for SetEngine {
    fn create(&self, snapshot: Option<&[u8]>) -> Result<Box<dyn DocState>, CrdtError> {
        let mut state = SetState::default();
        if let Some(bytes) = snapshot {
            state.apply(bytes)?;
        }
        Ok(Box::new(state))
    }
}

/// Engine whose replicas take updates but can never encode a snapshot.
#[derive(Default)]
pub(crate) struct UnencodableEngine;

struct UnencodableState;

impl DocState for UnencodableState {
    fn apply(&mut self, _update: &[u8]) -> Result<(), CrdtError> {
        Ok(())
    }

    fn full_state(&self) -> Result<Vec<u8>, CrdtError> {
        Err(CrdtError::Encode("encoder unavailable".to_string()))
    }
}

impl DocEngine for UnencodableEngine {
    fn create(&self, _snapshot: Option<&[u8]>) -> Result<Box<dyn DocState>, CrdtError> {
        Ok(Box::new(UnencodableState))
    }
}

#[test]
fn test_set_apply_twice_equals_once() {
    let mut once = SetState::default();
    once.apply(&frame(&["a", "b"])).unwrap();
    let mut twice = once.clone();
    twice.apply(&frame(&["a", "b"])).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_set_rejects_garbage_atomically() {
    let mut state = SetState::default();
    assert!(state.apply(b"+ok\nnope").is_err());
    assert!(state.items.is_empty());
}
