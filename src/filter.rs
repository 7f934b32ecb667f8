//! Acceptance filter configuration.
//!
//! The driver's range filter only ever widens: each call adds a range to
//! what the channel already accepts. [`AcceptanceFilter`] mirrors that set
//! on the host so callers can ask what a channel currently lets through.

use crate::error::{CanError, Result};
use crate::message::{MAX_EXTENDED_ID, MAX_STANDARD_ID};
use crate::parameter::FilterState;

/// ID width a filter range applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterMode {
    Standard = 0x00,
    Extended = 0x02,
}

impl FilterMode {
    pub fn raw(self) -> u8 {
        self as u8
    }

    pub fn max_id(self) -> u32 {
        match self {
            FilterMode::Standard => MAX_STANDARD_ID,
            FilterMode::Extended => MAX_EXTENDED_ID,
        }
    }
}

/// Checks `from..=to` against the width of `mode`.
pub fn validate_range(from: u32, to: u32, mode: FilterMode) -> Result<()> {
    if from > to || to > mode.max_id() {
        return Err(CanError::InvalidFilterRange { from, to });
    }
    Ok(())
}

/// Host-side mirror of a channel's acceptance filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptanceFilter {
    /// Nothing is received
    Closed,
    /// Everything is received
    Open,
    /// Only the listed inclusive ranges are received
    Ranges {
        standard: Vec<(u32, u32)>,
        extended: Vec<(u32, u32)>,
    },
}

impl Default for AcceptanceFilter {
    /// Channels come up with the filter fully open.
    fn default() -> Self {
        AcceptanceFilter::Open
    }
}

impl AcceptanceFilter {
    /// Widens the filter by `from..=to`.
    pub fn add(&mut self, from: u32, to: u32, mode: FilterMode) -> Result<()> {
        validate_range(from, to, mode)?;
        match self {
            AcceptanceFilter::Open => {}
            AcceptanceFilter::Closed => {
                let (standard, extended) = match mode {
                    FilterMode::Standard => (vec![(from, to)], Vec::new()),
                    FilterMode::Extended => (Vec::new(), vec![(from, to)]),
                };
                *self = AcceptanceFilter::Ranges { standard, extended };
            }
            AcceptanceFilter::Ranges { standard, extended } => {
                let ranges = match mode {
                    FilterMode::Standard => standard,
                    FilterMode::Extended => extended,
                };
                insert_range(ranges, from, to);
            }
        }
        Ok(())
    }

    /// Applies an explicit `MessageFilter` write.
    pub fn reset(&mut self, state: FilterState) {
        match state {
            FilterState::Close => *self = AcceptanceFilter::Closed,
            FilterState::Open => *self = AcceptanceFilter::Open,
            FilterState::Custom => {
                if !matches!(self, AcceptanceFilter::Ranges { .. }) {
                    *self = AcceptanceFilter::Ranges {
                        standard: Vec::new(),
                        extended: Vec::new(),
                    };
                }
            }
        }
    }

    pub fn state(&self) -> FilterState {
        match self {
            AcceptanceFilter::Closed => FilterState::Close,
            AcceptanceFilter::Open => FilterState::Open,
            AcceptanceFilter::Ranges { .. } => FilterState::Custom,
        }
    }

    pub fn accepts(&self, id: u32, extended: bool) -> bool {
        match self {
            AcceptanceFilter::Closed => false,
            AcceptanceFilter::Open => true,
            AcceptanceFilter::Ranges {
                standard,
                extended: ext,
            } => {
                let ranges = if extended { ext } else { standard };
                ranges.iter().any(|(from, to)| (*from..=*to).contains(&id))
            }
        }
    }
}

/// Inserts a range keeping the list sorted with overlaps merged.
fn insert_range(ranges: &mut Vec<(u32, u32)>, from: u32, to: u32) {
    ranges.push((from, to));
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (from, to) in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if from <= last.1.saturating_add(1) => last.1 = last.1.max(to),
            _ => merged.push((from, to)),
        }
    }
    *ranges = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0x100, 0x1FF, FilterMode::Standard).is_ok());
        assert!(validate_range(0x7FF, 0x7FF, FilterMode::Standard).is_ok());
        assert_eq!(
            validate_range(0x200, 0x100, FilterMode::Standard),
            Err(CanError::InvalidFilterRange {
                from: 0x200,
                to: 0x100
            })
        );
        assert!(validate_range(0x100, 0x800, FilterMode::Standard).is_err());
        assert!(validate_range(0x100, 0x800, FilterMode::Extended).is_ok());
        assert!(validate_range(0, 0x2000_0000, FilterMode::Extended).is_err());
    }

    #[test]
    fn test_filter_only_widens() {
        let mut filter = AcceptanceFilter::Closed;
        assert!(!filter.accepts(0x100, false));

        filter.add(0x100, 0x1FF, FilterMode::Standard).unwrap();
        assert!(filter.accepts(0x150, false));
        assert!(!filter.accepts(0x150, true));
        assert!(!filter.accepts(0x250, false));

        filter.add(0x200, 0x2FF, FilterMode::Standard).unwrap();
        assert!(filter.accepts(0x150, false));
        assert!(filter.accepts(0x250, false));

        let before = filter.clone();
        assert!(filter.add(0x300, 0x200, FilterMode::Standard).is_err());
        assert_eq!(filter, before);
    }

    #[test]
    fn test_open_filter_stays_open() {
        let mut filter = AcceptanceFilter::default();
        filter.add(0x10, 0x20, FilterMode::Standard).unwrap();
        assert_eq!(filter, AcceptanceFilter::Open);
        assert!(filter.accepts(0x7FF, false));
    }

    #[test]
    fn test_ranges_merge() {
        let mut filter = AcceptanceFilter::Closed;
        filter.add(0x300, 0x3FF, FilterMode::Extended).unwrap();
        filter.add(0x100, 0x1FF, FilterMode::Extended).unwrap();
        filter.add(0x180, 0x2FF, FilterMode::Extended).unwrap();
        match &filter {
            AcceptanceFilter::Ranges { extended, standard } => {
                assert_eq!(extended, &vec![(0x100, 0x3FF)]);
                assert!(standard.is_empty());
            }
            other => panic!("unexpected filter {other:?}"),
        }
    }

    #[test]
    fn test_reset() {
        let mut filter = AcceptanceFilter::Closed;
        filter.add(0x100, 0x1FF, FilterMode::Standard).unwrap();
        filter.reset(FilterState::Custom);
        assert!(filter.accepts(0x100, false));
        assert_eq!(filter.state(), FilterState::Custom);

        filter.reset(FilterState::Close);
        assert!(!filter.accepts(0x100, false));
        filter.reset(FilterState::Open);
        assert!(filter.accepts(0x1FFF_FFFF, true));
    }
}
