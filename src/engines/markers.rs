use std::collections::HashMap;

/// Speaker-to-marker assignments for native multi-speaker engines.
///
/// Speakers get marker slots in order of first appearance. Once every slot is
/// taken, new speakers cycle back through them. The assignments are owned by the
/// caller so one render can thread them across all of its chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerMarkers {
    slots: HashMap<String, usize>,
    first_seen: usize,
}

impl SpeakerMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `speaker`, assigning the next one on first sight.
    pub fn assign(&mut self, speaker: &str, capacity: usize) -> usize {
        if let Some(&slot) = self.slots.get(speaker) {
            return slot;
        }
        let slot = self.first_seen % capacity.max(1);
        self.first_seen += 1;
        self.slots.insert(speaker.to_string(), slot);
        slot
    }

    /// Force `speaker` onto `slot`, e.g. from an explicit voice map entry.
    pub fn pin(&mut self, speaker: &str, slot: usize) {
        self.slots.insert(speaker.to_string(), slot);
    }

    pub fn get(&self, speaker: &str) -> Option<usize> {
        self.slots.get(speaker).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
