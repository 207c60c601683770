//! Poll groups and per-machine scheduling records.
//!
//! One map owns every tracked machine; each entry carries its group. The
//! reverse index from instance id to tag is maintained alongside so poll
//! results, which come back keyed by instance id, can be matched to their
//! entries without a scan.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use fleet_model::{InstanceId, MachineTag};

use crate::config::PollIntervals;

/// The two poll cohorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollGroup {
    /// Sub-minute cadence with exponential backoff; machines in flux.
    Short,
    /// Fixed multi-minute cadence; settled machines, drift detection only.
    Long,
}

/// Per-machine scheduling record.
pub(crate) struct PollEntry<M> {
    pub(crate) tag: MachineTag,
    pub(crate) machine: Arc<M>,

    /// Set once on first successful resolution, then immutable.
    pub(crate) instance_id: Option<InstanceId>,

    pub(crate) group: PollGroup,

    /// Current short-poll backoff, within [short_poll, long_poll].
    pub(crate) short_interval: Duration,

    /// When this entry next becomes eligible for a short-poll sweep.
    pub(crate) due_at: Instant,
}

impl<M> PollEntry<M> {
    fn new(tag: MachineTag, machine: Arc<M>, now: Instant, intervals: &PollIntervals) -> Self {
        Self {
            tag,
            machine,
            instance_id: None,
            group: PollGroup::Short,
            short_interval: intervals.short_poll,
            due_at: now + intervals.short_poll,
        }
    }

    /// Drop back to the base short-poll cadence.
    pub(crate) fn reset(&mut self, now: Instant, intervals: &PollIntervals) {
        self.short_interval = intervals.short_poll;
        self.due_at = now + self.short_interval;
    }

    /// Back off: the machine was not ready, check again later but less
    /// often, never slower than the long-poll cadence.
    pub(crate) fn bump(&mut self, now: Instant, intervals: &PollIntervals) {
        self.short_interval = self
            .short_interval
            .mul_f64(intervals.short_poll_backoff)
            .min(intervals.long_poll);
        self.due_at = now + self.short_interval;
    }
}

/// Every tracked machine, plus the instance-id reverse index.
pub(crate) struct GroupSet<M> {
    entries: HashMap<MachineTag, PollEntry<M>>,
    by_instance: HashMap<InstanceId, MachineTag>,
}

impl<M> GroupSet<M> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_instance: HashMap::new(),
        }
    }

    pub(crate) fn get(&self, tag: &MachineTag) -> Option<&PollEntry<M>> {
        self.entries.get(tag)
    }

    pub(crate) fn get_mut(&mut self, tag: &MachineTag) -> Option<&mut PollEntry<M>> {
        self.entries.get_mut(tag)
    }

    /// Start tracking a machine in the short group at base cadence.
    pub(crate) fn insert_short(
        &mut self,
        tag: MachineTag,
        machine: Arc<M>,
        now: Instant,
        intervals: &PollIntervals,
    ) {
        let entry = PollEntry::new(tag.clone(), machine, now, intervals);
        self.entries.insert(tag, entry);
    }

    /// Stop tracking a machine, clearing its reverse-index slot.
    pub(crate) fn remove(&mut self, tag: &MachineTag) -> Option<PollEntry<M>> {
        let entry = self.entries.remove(tag)?;
        if let Some(id) = &entry.instance_id {
            self.by_instance.remove(id);
        }
        Some(entry)
    }

    /// Change an entry's group; no-op when already there.
    pub(crate) fn move_to(&mut self, tag: &MachineTag, group: PollGroup) {
        if let Some(entry) = self.entries.get_mut(tag) {
            entry.group = group;
        }
    }

    /// Record a freshly resolved instance id.
    pub(crate) fn set_instance_id(&mut self, tag: &MachineTag, id: InstanceId) {
        if let Some(entry) = self.entries.get_mut(tag) {
            entry.instance_id = Some(id.clone());
            self.by_instance.insert(id, tag.clone());
        }
    }

    pub(crate) fn tag_for_instance(&self, id: &InstanceId) -> Option<&MachineTag> {
        self.by_instance.get(id)
    }

    /// Tags of every entry currently in `group`.
    pub(crate) fn members(&self, group: PollGroup) -> Vec<MachineTag> {
        self.entries
            .values()
            .filter(|entry| entry.group == group)
            .map(|entry| entry.tag.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check the structural invariants that must hold between handlers.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self, intervals: &PollIntervals) {
        for (tag, entry) in &self.entries {
            assert_eq!(tag, &entry.tag);
            assert!(
                entry.short_interval >= intervals.short_poll
                    && entry.short_interval <= intervals.long_poll,
                "interval out of bounds for {tag}: {:?}",
                entry.short_interval
            );
            if let Some(id) = &entry.instance_id {
                assert_eq!(
                    self.by_instance.get(id),
                    Some(tag),
                    "reverse index missing or wrong for {tag}"
                );
            }
        }
        for (id, tag) in &self.by_instance {
            let entry = self.entries.get(tag).expect("orphan reverse-index entry");
            assert_eq!(entry.instance_id.as_ref(), Some(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intervals() -> PollIntervals {
        PollIntervals::default()
    }

    fn track(groups: &mut GroupSet<()>, tag: &str) -> MachineTag {
        let tag = MachineTag::new(tag);
        groups.insert_short(tag.clone(), Arc::new(()), Instant::now(), &intervals());
        tag
    }

    #[test]
    fn new_entries_join_the_short_group_at_base_cadence() {
        let mut groups: GroupSet<()> = GroupSet::new();
        let tag = track(&mut groups, "0");

        let entry = groups.get(&tag).unwrap();
        assert_eq!(entry.group, PollGroup::Short);
        assert_eq!(entry.short_interval, intervals().short_poll);
        assert!(entry.instance_id.is_none());
        groups.assert_invariants(&intervals());
    }

    #[test]
    fn reset_is_idempotent() {
        let mut groups: GroupSet<()> = GroupSet::new();
        let tag = track(&mut groups, "0");
        let now = Instant::now();

        let entry = groups.get_mut(&tag).unwrap();
        entry.bump(now, &intervals());
        entry.reset(now, &intervals());
        assert_eq!(entry.short_interval, intervals().short_poll);
        entry.reset(now, &intervals());
        assert_eq!(entry.short_interval, intervals().short_poll);
        assert_eq!(entry.due_at, now + intervals().short_poll);
    }

    #[test]
    fn bump_grows_geometrically_up_to_the_long_interval() {
        let intervals = PollIntervals {
            short_poll: Duration::from_secs(1),
            long_poll: Duration::from_secs(10),
            short_poll_backoff: 2.0,
        };
        let mut groups: GroupSet<()> = GroupSet::new();
        let tag = MachineTag::new("0");
        groups.insert_short(tag.clone(), Arc::new(()), Instant::now(), &intervals);

        let now = Instant::now();
        let entry = groups.get_mut(&tag).unwrap();
        let expected = [2, 4, 8, 10, 10];
        for secs in expected {
            entry.bump(now, &intervals);
            assert_eq!(entry.short_interval, Duration::from_secs(secs));
            assert_eq!(entry.due_at, now + entry.short_interval);
        }
    }

    #[test]
    fn moving_between_groups_is_exclusive() {
        let mut groups: GroupSet<()> = GroupSet::new();
        let tag = track(&mut groups, "0");

        groups.move_to(&tag, PollGroup::Long);
        assert_eq!(groups.members(PollGroup::Long), vec![tag.clone()]);
        assert!(groups.members(PollGroup::Short).is_empty());

        // No-op move.
        groups.move_to(&tag, PollGroup::Long);
        assert_eq!(groups.members(PollGroup::Long).len(), 1);

        groups.move_to(&tag, PollGroup::Short);
        assert_eq!(groups.members(PollGroup::Short), vec![tag]);
        assert!(groups.members(PollGroup::Long).is_empty());
    }

    #[test]
    fn removal_clears_the_reverse_index() {
        let mut groups: GroupSet<()> = GroupSet::new();
        let tag = track(&mut groups, "0");
        let id = InstanceId::new("i-0");

        groups.set_instance_id(&tag, id.clone());
        assert_eq!(groups.tag_for_instance(&id), Some(&tag));
        groups.assert_invariants(&intervals());

        let removed = groups.remove(&tag).unwrap();
        assert_eq!(removed.instance_id, Some(id.clone()));
        assert_eq!(groups.tag_for_instance(&id), None);
        assert_eq!(groups.len(), 0);
        groups.assert_invariants(&intervals());
    }
}
