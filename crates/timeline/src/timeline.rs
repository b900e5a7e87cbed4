use std::sync::Arc;

use crate::builtin::SolidSource;
use crate::keyframe::{Keyframe, KeyframeId};
use crate::TimelineError;

/// Keyframes in insertion order, sorted by time on demand.
///
/// Mutations only mark the collection dirty; the next [`Timeline::ordered_view`]
/// performs a stable sort, so keyframes with equal times keep their relative
/// position (insertion order, a replacement inheriting the slot it replaced).
/// Index-addressed operations refer to positions in the ordered view.
#[derive(Debug, Default)]
pub struct Timeline {
    keyframes: Vec<Keyframe>,
    dirty: bool,
    sort_count: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    pub fn contains(&self, id: KeyframeId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: KeyframeId) -> Option<&Keyframe> {
        self.keyframes.iter().find(|keyframe| keyframe.id() == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = KeyframeId> + '_ {
        self.keyframes.iter().map(Keyframe::id)
    }

    /// How many times the collection has been re-sorted.
    pub fn sort_count(&self) -> u64 {
        self.sort_count
    }

    pub fn ordered_view(&mut self) -> &[Keyframe] {
        self.sort_if_dirty();
        &self.keyframes
    }

    pub fn insert(&mut self, keyframe: Keyframe) -> Result<KeyframeId, TimelineError> {
        let id = keyframe.id();
        if self.contains(id) {
            return Err(TimelineError::DuplicateKeyframe(id));
        }
        self.keyframes.push(keyframe);
        self.dirty = true;
        Ok(id)
    }

    /// Insert a keyframe with a blank solid source and no operators.
    pub fn create(&mut self, time: i64) -> KeyframeId {
        let keyframe = Keyframe::new(time, Arc::new(SolidSource::new(16, 16, [255; 4])));
        let id = keyframe.id();
        self.keyframes.push(keyframe);
        self.dirty = true;
        id
    }

    pub fn remove_at(&mut self, index: usize) -> Result<Keyframe, TimelineError> {
        self.check_index(index)?;
        let removed = self.keyframes.remove(index);
        self.dirty = true;
        Ok(removed)
    }

    pub fn remove(&mut self, id: KeyframeId) -> Result<Keyframe, TimelineError> {
        let index = self
            .position(id)
            .ok_or(TimelineError::UnknownKeyframe(id))?;
        let removed = self.keyframes.remove(index);
        self.dirty = true;
        Ok(removed)
    }

    /// Swap the keyframe at `index` for `keyframe`, returning the old one.
    pub fn replace_at(
        &mut self,
        index: usize,
        keyframe: Keyframe,
    ) -> Result<Keyframe, TimelineError> {
        self.check_index(index)?;
        self.check_replacement(index, &keyframe)?;
        let old = std::mem::replace(&mut self.keyframes[index], keyframe);
        self.dirty = true;
        Ok(old)
    }

    pub fn replace(
        &mut self,
        id: KeyframeId,
        keyframe: Keyframe,
    ) -> Result<Keyframe, TimelineError> {
        let index = self
            .position(id)
            .ok_or(TimelineError::UnknownKeyframe(id))?;
        self.check_replacement(index, &keyframe)?;
        let old = std::mem::replace(&mut self.keyframes[index], keyframe);
        self.dirty = true;
        Ok(old)
    }

    pub fn retime_at(&mut self, index: usize, time: i64) -> Result<KeyframeId, TimelineError> {
        self.check_index(index)?;
        let keyframe = &mut self.keyframes[index];
        keyframe.set_time(time);
        self.dirty = true;
        Ok(keyframe.id())
    }

    pub fn retime(&mut self, id: KeyframeId, time: i64) -> Result<(), TimelineError> {
        let index = self
            .position(id)
            .ok_or(TimelineError::UnknownKeyframe(id))?;
        self.keyframes[index].set_time(time);
        self.dirty = true;
        Ok(())
    }

    fn position(&self, id: KeyframeId) -> Option<usize> {
        self.keyframes.iter().position(|keyframe| keyframe.id() == id)
    }

    /// Index operations see the ordered view, so sort before resolving one.
    fn check_index(&mut self, index: usize) -> Result<(), TimelineError> {
        self.sort_if_dirty();
        if index >= self.keyframes.len() {
            return Err(TimelineError::IndexOutOfRange {
                index,
                len: self.keyframes.len(),
            });
        }
        Ok(())
    }

    fn check_replacement(&self, index: usize, keyframe: &Keyframe) -> Result<(), TimelineError> {
        match self.position(keyframe.id()) {
            Some(existing) if existing != index => {
                Err(TimelineError::DuplicateKeyframe(keyframe.id()))
            }
            _ => Ok(()),
        }
    }

    fn sort_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        self.keyframes.sort_by_key(Keyframe::time);
        self.dirty = false;
        self.sort_count += 1;
        tracing::trace!(keyframes = self.keyframes.len(), "timeline re-sorted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::ShowAction;

    fn keyframe(time: i64) -> Keyframe {
        Keyframe::new(time, Arc::new(SolidSource::new(1, 1, [0; 4])))
    }

    fn times(timeline: &mut Timeline) -> Vec<i64> {
        timeline.ordered_view().iter().map(Keyframe::time).collect()
    }

    #[test]
    fn ordered_view_sorts_once_until_mutated() {
        let mut timeline = Timeline::new();
        timeline.insert(keyframe(30)).unwrap();
        timeline.insert(keyframe(10)).unwrap();
        timeline.insert(keyframe(20)).unwrap();
        assert_eq!(timeline.sort_count(), 0);

        assert_eq!(times(&mut timeline), vec![10, 20, 30]);
        assert_eq!(timeline.sort_count(), 1);
        assert_eq!(times(&mut timeline), vec![10, 20, 30]);
        assert_eq!(timeline.sort_count(), 1);

        timeline.create(15);
        assert_eq!(times(&mut timeline), vec![10, 15, 20, 30]);
        assert_eq!(timeline.sort_count(), 2);
    }

    #[test]
    fn equal_times_keep_insertion_order() {
        let mut timeline = Timeline::new();
        let first = timeline.insert(keyframe(5)).unwrap();
        timeline.insert(keyframe(0)).unwrap();
        let second = timeline.insert(keyframe(5)).unwrap();
        let third = timeline.insert(keyframe(5)).unwrap();

        let ids: Vec<KeyframeId> = timeline.ordered_view()[1..]
            .iter()
            .map(Keyframe::id)
            .collect();
        assert_eq!(ids, vec![first, second, third]);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let mut timeline = Timeline::new();
        let kf = keyframe(0);
        timeline.insert(kf.clone()).unwrap();
        assert!(matches!(
            timeline.insert(kf),
            Err(TimelineError::DuplicateKeyframe(_))
        ));
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn index_operations_address_ordered_view() {
        let mut timeline = Timeline::new();
        timeline.insert(keyframe(40)).unwrap();
        let early = timeline.insert(keyframe(0)).unwrap();

        let removed = timeline.remove_at(0).unwrap();
        assert_eq!(removed.id(), early);
        assert_eq!(times(&mut timeline), vec![40]);

        assert!(matches!(
            timeline.remove_at(3),
            Err(TimelineError::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn retime_moves_keyframe() {
        let mut timeline = Timeline::new();
        let a = timeline.insert(keyframe(0)).unwrap();
        timeline.insert(keyframe(10)).unwrap();
        timeline.retime(a, 20).unwrap();
        assert_eq!(times(&mut timeline), vec![10, 20]);
        assert_eq!(timeline.ordered_view()[1].id(), a);

        let id = timeline.retime_at(1, 5).unwrap();
        assert_eq!(id, a);
        assert_eq!(times(&mut timeline), vec![5, 10]);
    }

    #[test]
    fn replace_swaps_operators() {
        let mut timeline = Timeline::new();
        let original = timeline.insert(keyframe(10)).unwrap();
        let replacement = keyframe(10).with_action(Arc::new(ShowAction { layer: 2 }));
        let new_id = replacement.id();

        let old = timeline.replace(original, replacement).unwrap();
        assert_eq!(old.id(), original);
        assert!(!timeline.contains(original));
        assert_eq!(timeline.get(new_id).map(|k| k.actions().len()), Some(1));

        let other = timeline.insert(keyframe(20)).unwrap();
        let clash = timeline.get(other).cloned().unwrap();
        assert!(matches!(
            timeline.replace_at(0, clash),
            Err(TimelineError::DuplicateKeyframe(_))
        ));
    }

    #[test]
    fn remove_unknown_id_fails() {
        let mut timeline = Timeline::new();
        let stray = keyframe(0);
        assert!(matches!(
            timeline.remove(stray.id()),
            Err(TimelineError::UnknownKeyframe(_))
        ));
    }
}
