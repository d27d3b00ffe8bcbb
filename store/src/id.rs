use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Stream entry id: milliseconds since the epoch plus a per-millisecond
/// sequence number, rendered `<ms>-<seq>`. Ids issued by one stream are
/// strictly increasing and define the canonical event order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    pub ms: u64,
    pub seq: u64,
}

impl EventId {
    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// The smallest id strictly greater than `self` for the same
    /// millisecond; used to issue monotonic ids when the clock stalls
    /// or steps backwards.
    pub fn next_after(self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self { ms: now_ms, seq: 0 }
        } else {
            Self {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EventId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ms, seq) = s
            .split_once('-')
            .ok_or_else(|| StoreError::corrupt("event id", format!("malformed id `{s}`")))?;
        let ms = ms
            .parse::<u64>()
            .map_err(|e| StoreError::corrupt("event id", e.to_string()))?;
        let seq = seq
            .parse::<u64>()
            .map_err(|e| StoreError::corrupt("event id", e.to_string()))?;
        Ok(Self { ms, seq })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_and_parses() {
        let id = EventId::new(1700000000123, 4);
        assert_eq!(id.to_string(), "1700000000123-4");
        assert_eq!("1700000000123-4".parse::<EventId>().unwrap(), id);
        assert!("nonsense".parse::<EventId>().is_err());
    }

    #[test]
    fn next_after_is_strictly_increasing() {
        let id = EventId::new(100, 2);
        assert_eq!(id.next_after(200), EventId::new(200, 0));
        // Clock stalled or stepped back: bump the sequence instead.
        assert_eq!(id.next_after(100), EventId::new(100, 3));
        assert_eq!(id.next_after(50), EventId::new(100, 3));
    }

    #[test]
    fn ordering_is_ms_then_seq() {
        assert!(EventId::new(1, 9) < EventId::new(2, 0));
        assert!(EventId::new(2, 0) < EventId::new(2, 1));
    }
}
