//! Lcore (logical core) identifiers, sets and layouts.
//!
//! # Overview
//!
//! An lcore is identified by a `u32` drawn from `0..MAX_LCORE`. The
//! privileged initializer reports which lcores it activated as an
//! [`LcoreLayout`]: the enabled [`LcoreSet`], the main lcore, and each
//! lcore's CPU and NUMA socket.
//!
//! # Example
//!
//! ```
//! use dpdk_lcore::api::lcore::{LcoreLayout, LcoreSet};
//!
//! let set = LcoreSet::parse_list("0-3").unwrap();
//! let layout = LcoreLayout::new(set, 0);
//!
//! let workers: Vec<u32> = layout.lcores(true).collect();
//! assert_eq!(workers, [1, 2, 3]);
//! ```

use crate::api::{Errno, Result};

/// Maximum number of lcores, fixed at build time.
pub const MAX_LCORE: u32 = 128;

/// Special value indicating "any lcore" or "not an lcore thread"
pub const LCORE_ID_ANY: u32 = u32::MAX;

const WORDS: usize = (MAX_LCORE as usize).div_ceil(64);

/// State of an lcore's run-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    /// Lcore is waiting for the next work unit
    Wait = 0,
    /// Lcore is running a work unit
    Running = 1,
    /// Lcore has received its stop instruction and left its run-loop
    Exited = 2,
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Exited,
            _ => Self::Wait,
        }
    }
}

/// A set of lcore ids within `0..MAX_LCORE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LcoreSet {
    bits: [u64; WORDS],
}

impl LcoreSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a core list such as `"0-3"`, `"0,2,4"` or `"1-2,5"`.
    pub fn parse_list(list: &str) -> Result<Self> {
        let mut set = Self::new();
        for part in list.split(',').map(str::trim) {
            if part.is_empty() {
                return Err(Errno::EINVAL);
            }
            let (lo, hi) = match part.split_once('-') {
                Some((lo, hi)) => (parse_id(lo)?, parse_id(hi)?),
                None => {
                    let id = parse_id(part)?;
                    (id, id)
                }
            };
            if lo > hi {
                return Err(Errno::EINVAL);
            }
            for id in lo..=hi {
                set.insert(id)?;
            }
        }
        Ok(set)
    }

    /// Parse a hexadecimal core mask such as `"0xf"` (lcores 0-3).
    pub fn parse_mask(mask: &str) -> Result<Self> {
        let digits = mask
            .trim()
            .strip_prefix("0x")
            .or_else(|| mask.trim().strip_prefix("0X"))
            .unwrap_or(mask.trim());
        if digits.is_empty() {
            return Err(Errno::EINVAL);
        }

        let mut set = Self::new();
        // Least significant nibble is the last character.
        for (nibble_idx, c) in digits.chars().rev().enumerate() {
            let nibble = c.to_digit(16).ok_or(Errno::EINVAL)?;
            for bit in 0..4 {
                if nibble & (1 << bit) != 0 {
                    let id = u32::try_from(nibble_idx * 4 + bit).map_err(|_| Errno::EINVAL)?;
                    set.insert(id)?;
                }
            }
        }
        Ok(set)
    }

    /// Add an lcore id. Fails with `EINVAL` outside the lcore universe.
    pub fn insert(&mut self, id: u32) -> Result<()> {
        if id >= MAX_LCORE {
            return Err(Errno::EINVAL);
        }
        self.bits[(id / 64) as usize] |= 1 << (id % 64);
        Ok(())
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        id < MAX_LCORE && self.bits[(id / 64) as usize] & (1 << (id % 64)) != 0
    }

    pub fn len(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|w| *w == 0)
    }

    /// Lowest id in the set.
    pub fn first(&self) -> Option<u32> {
        (0..MAX_LCORE).find(|id| self.contains(*id))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..MAX_LCORE).filter(|id| self.contains(*id))
    }
}

fn parse_id(s: &str) -> Result<u32> {
    s.trim().parse::<u32>().map_err(|_| Errno::EINVAL)
}

/// Per-lcore placement reported by the initializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Physical CPU the lcore thread is pinned to.
    pub cpu_id: u32,
    /// NUMA socket of that CPU.
    pub socket_id: u32,
}

/// The lcores activated by the privileged initializer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcoreLayout {
    enabled: LcoreSet,
    main: u32,
    placements: Vec<(u32, Placement)>,
}

impl LcoreLayout {
    /// Layout where every lcore N sits on CPU N, socket 0.
    ///
    /// `main` must be a member of `enabled`.
    pub fn new(enabled: LcoreSet, main: u32) -> Self {
        let placements = enabled
            .iter()
            .map(|id| {
                (
                    id,
                    Placement {
                        cpu_id: id,
                        socket_id: 0,
                    },
                )
            })
            .collect();
        Self {
            enabled,
            main,
            placements,
        }
    }

    /// Override the placement of one lcore.
    pub fn with_placement(mut self, id: u32, placement: Placement) -> Self {
        if let Some(slot) = self.placements.iter_mut().find(|(l, _)| *l == id) {
            slot.1 = placement;
        }
        self
    }

    pub fn enabled(&self) -> &LcoreSet {
        &self.enabled
    }

    /// The coordinator lcore.
    pub fn main_lcore(&self) -> u32 {
        self.main
    }

    /// Number of enabled lcores, main included.
    pub fn count(&self) -> u32 {
        self.enabled.len()
    }

    pub fn placement(&self, id: u32) -> Option<Placement> {
        self.placements
            .iter()
            .find(|(l, _)| *l == id)
            .map(|(_, p)| *p)
    }

    /// Get the NUMA socket for an lcore, 0 when unknown.
    pub fn socket_id(&self, id: u32) -> u32 {
        self.placement(id).map(|p| p.socket_id).unwrap_or(0)
    }

    /// Next enabled lcore strictly after `i`, as `rte_get_next_lcore` with
    /// `wrap = 0`. Passing `u32::MAX` starts from the beginning. Returns
    /// a value `>= MAX_LCORE` when exhausted.
    pub fn next_lcore(&self, i: u32, skip_main: bool) -> u32 {
        let mut id = i.wrapping_add(1);
        while id < MAX_LCORE {
            if self.enabled.contains(id) && !(skip_main && id == self.main) {
                return id;
            }
            id += 1;
        }
        MAX_LCORE
    }

    /// Iterate over enabled lcores in ascending order.
    ///
    /// When `skip_main` is true the main lcore is left out.
    pub fn lcores(&self, skip_main: bool) -> LcoreIter<'_> {
        LcoreIter {
            layout: self,
            current: u32::MAX,
            skip_main,
        }
    }
}

/// Iterator over lcores of a layout.
pub struct LcoreIter<'a> {
    layout: &'a LcoreLayout,
    current: u32,
    skip_main: bool,
}

impl Iterator for LcoreIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.layout.next_lcore(self.current, self.skip_main);
        if next >= MAX_LCORE {
            None
        } else {
            self.current = next;
            Some(next)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = ExactSizeIterator::len(self);
        (n, Some(n))
    }
}

impl ExactSizeIterator for LcoreIter<'_> {
    fn len(&self) -> usize {
        let mut count = 0;
        let mut current = self.current;
        loop {
            let next = self.layout.next_lcore(current, self.skip_main);
            if next >= MAX_LCORE {
                break;
            }
            count += 1;
            current = next;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from() {
        assert_eq!(State::from(0), State::Wait);
        assert_eq!(State::from(1), State::Running);
        assert_eq!(State::from(2), State::Exited);
        assert_eq!(State::from(99), State::Wait); // default
    }

    #[test]
    fn test_parse_list() {
        let set = LcoreSet::parse_list("1-2,5").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), [1, 2, 5]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.first(), Some(1));

        let set = LcoreSet::parse_list("0, 2 ,4").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), [0, 2, 4]);

        assert_eq!(LcoreSet::parse_list("3-1"), Err(Errno::EINVAL));
        assert_eq!(LcoreSet::parse_list("0,,1"), Err(Errno::EINVAL));
        assert_eq!(LcoreSet::parse_list("x"), Err(Errno::EINVAL));
        assert_eq!(LcoreSet::parse_list("127-128"), Err(Errno::EINVAL));
    }

    #[test]
    fn test_parse_mask() {
        let set = LcoreSet::parse_mask("0xf").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), [0, 1, 2, 3]);

        let set = LcoreSet::parse_mask("A").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), [1, 3]);

        let set = LcoreSet::parse_mask("0x10").unwrap();
        assert_eq!(set.iter().collect::<Vec<_>>(), [4]);

        assert_eq!(LcoreSet::parse_mask("0x"), Err(Errno::EINVAL));
        assert_eq!(LcoreSet::parse_mask("0xg"), Err(Errno::EINVAL));
        // Bit 128 is outside the lcore universe.
        let too_wide = format!("0x1{}", "0".repeat(32));
        assert_eq!(LcoreSet::parse_mask(&too_wide), Err(Errno::EINVAL));
    }

    #[test]
    fn test_layout_iteration() {
        let layout = LcoreLayout::new(LcoreSet::parse_list("0-3").unwrap(), 0);
        assert_eq!(layout.count(), 4);
        assert_eq!(layout.lcores(false).collect::<Vec<_>>(), [0, 1, 2, 3]);
        assert_eq!(layout.lcores(true).collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(layout.lcores(true).len(), 3);

        // Main in the middle of the set.
        let layout = LcoreLayout::new(LcoreSet::parse_list("2,5,9").unwrap(), 5);
        assert_eq!(layout.lcores(true).collect::<Vec<_>>(), [2, 9]);
        assert_eq!(layout.next_lcore(9, false), MAX_LCORE);
    }

    #[test]
    fn test_layout_placement() {
        let layout = LcoreLayout::new(LcoreSet::parse_list("0-1").unwrap(), 0).with_placement(
            1,
            Placement {
                cpu_id: 7,
                socket_id: 1,
            },
        );
        assert_eq!(layout.placement(0).map(|p| p.cpu_id), Some(0));
        assert_eq!(layout.placement(1).map(|p| p.cpu_id), Some(7));
        assert_eq!(layout.socket_id(1), 1);
        assert_eq!(layout.socket_id(42), 0);
        assert!(layout.placement(42).is_none());
    }
}
