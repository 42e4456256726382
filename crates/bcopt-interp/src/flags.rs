use std::collections::BTreeMap;
use std::fmt;

use bcopt_ir::{BlockId, Bytecode, LocalId};
use bcopt_types::{HasBottom, Lattice, Type};

/// Locals beyond this id are not tracked individually.
pub const MAX_TRACKED_LOCALS: usize = 512;
/// Class-reference slots beyond this id are not tracked individually.
pub const MAX_TRACKED_CLS_REF_SLOTS: usize = 64;

const WORDS: usize = MAX_TRACKED_LOCALS / 64;

/// A set of locals with room for [`MAX_TRACKED_LOCALS`] members.
///
/// Every id at or beyond the bound is implicitly a member: `insert` ignores
/// it and `contains` always answers `true`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LocalSet {
    words: [u64; WORDS],
}

impl LocalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set of all locals.
    pub fn full() -> Self {
        LocalSet {
            words: [!0; WORDS],
        }
    }

    pub fn insert(&mut self, local: LocalId) {
        let idx = local.index();
        if idx < MAX_TRACKED_LOCALS {
            self.words[idx / 64] |= 1 << (idx % 64);
        }
    }

    pub fn insert_all(&mut self) {
        self.words = [!0; WORDS];
    }

    pub fn contains(&self, local: LocalId) -> bool {
        let idx = local.index();
        idx >= MAX_TRACKED_LOCALS || (self.words[idx / 64] >> (idx % 64)) & 1 == 1
    }

    pub fn union_with(&mut self, other: &Self) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
    }

    /// Whether no tracked local is a member.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn is_full(&self) -> bool {
        self.words.iter().all(|w| *w == !0)
    }

    /// Tracked members in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = LocalId> + '_ {
        (0..MAX_TRACKED_LOCALS)
            .filter(|idx| (self.words[idx / 64] >> (idx % 64)) & 1 == 1)
            .map(|idx| LocalId::new(idx as u32))
    }
}

impl fmt::Debug for LocalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_full() {
            return f.write_str("{all}");
        }
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Local statics observed by an instruction or block, with the type the
/// index reported for each.
pub type UsedLocalStatics = BTreeMap<LocalId, Type>;

/// What a single instruction did.
#[derive(Clone, Debug, PartialEq)]
pub struct StepFlags {
    /// Whether the instruction may throw.
    pub was_pei: bool,
    /// Set when control unconditionally continues at exactly this block.
    pub jmp_dest: Option<BlockId>,
    /// The instruction may be replaced by popping its inputs and pushing the
    /// constant it produced.
    pub can_const_prop: bool,
    /// Removing the instruction (with its outputs unused) is unobservable.
    pub effect_free: bool,
    /// Superset of the locals the instruction may read.
    pub may_read_local_set: LocalSet,
    /// A cheaper equivalent instruction sequence.
    pub strength_reduced: Option<Vec<Bytecode>>,
    /// Type of the returned value, if the instruction returns.
    pub returned: Option<Type>,
    /// The parameter returned unmodified, if any.
    pub ret_param: Option<LocalId>,
    pub used_local_statics: Option<UsedLocalStatics>,
}

impl Default for StepFlags {
    fn default() -> Self {
        StepFlags {
            was_pei: true,
            jmp_dest: None,
            can_const_prop: false,
            effect_free: false,
            may_read_local_set: LocalSet::new(),
            strength_reduced: None,
            returned: None,
            ret_param: None,
            used_local_statics: None,
        }
    }
}

/// What a whole block did.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunFlags {
    pub returned: Option<Type>,
    pub ret_param: Option<LocalId>,
    pub used_local_statics: Option<UsedLocalStatics>,
}

impl RunFlags {
    /// The block's contribution to the function's return type; `Bottom` when
    /// the block does not return.
    pub fn return_contribution(&self) -> Type {
        self.returned.clone().unwrap_or_else(Type::bottom)
    }
}

/// Fold `from` into `into`, joining the types of statics present in both.
pub(crate) fn merge_used_local_statics(
    into: &mut Option<UsedLocalStatics>,
    from: Option<UsedLocalStatics>,
) {
    let Some(from) = from else { return };
    if let Some(acc) = into.as_mut() {
        for (local, ty) in from {
            acc.entry(local)
                .and_modify(|seen| *seen = seen.join(&ty))
                .or_insert(ty);
        }
    } else {
        *into = Some(from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untracked_locals_are_always_members() {
        let mut set = LocalSet::new();
        set.insert(LocalId::new(3));
        set.insert(LocalId::new(600));
        assert!(set.contains(LocalId::new(3)));
        assert!(!set.contains(LocalId::new(4)));
        assert!(set.contains(LocalId::new(511 + 1)));
        assert!(set.contains(LocalId::new(600)));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![LocalId::new(3)]);
        assert_eq!(format!("{set:?}"), "{LocalId(3)}");

        set.insert_all();
        assert!(set.is_full());
        assert!(set.contains(LocalId::new(511)));
        assert_eq!(LocalSet::full(), set);
    }

    #[test]
    fn step_flags_default_to_pei() {
        let flags = StepFlags::default();
        assert!(flags.was_pei);
        assert!(!flags.can_const_prop);
        assert!(!flags.effect_free);
        assert!(flags.may_read_local_set.is_empty());
    }

    #[test]
    fn used_statics_merge_by_join() {
        let l0 = LocalId::new(0);
        let l1 = LocalId::new(1);
        let mut acc = None;
        merge_used_local_statics(&mut acc, None);
        assert_eq!(acc, None);
        merge_used_local_statics(&mut acc, Some(BTreeMap::from([(l0, Type::int())])));
        merge_used_local_statics(
            &mut acc,
            Some(BTreeMap::from([(l0, Type::str()), (l1, Type::bool())])),
        );
        let acc = acc.unwrap_or_default();
        assert_eq!(acc[&l0], Type::int().join(&Type::str()));
        assert_eq!(acc[&l1], Type::bool());
    }

    #[test]
    fn missing_return_contributes_bottom() {
        assert!(RunFlags::default().return_contribution().is_bottom());
        let flags = RunFlags {
            returned: Some(Type::int_val(3)),
            ..RunFlags::default()
        };
        assert_eq!(flags.return_contribution(), Type::int_val(3));
    }
}
