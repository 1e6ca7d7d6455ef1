use std::fmt;

/// Item IDs a visitor has already been sent to, newest first.
///
/// The list lives client side (a cookie); it is passed explicitly into
/// selection so no request state is kept in the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenList {
    ids: Vec<i64>,
}

impl SeenList {
    pub const MAX: usize = 100;

    /// Parse a comma separated list, ignoring anything that is not an ID.
    pub fn parse(value: &str) -> Self {
        let mut ids: Vec<i64> = value
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect();
        ids.truncate(Self::MAX);
        Self { ids }
    }

    pub fn push(&mut self, id: i64) {
        self.ids.insert(0, id);
        self.ids.truncate(Self::MAX);
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl fmt::Display for SeenList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .ids
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_skipped() {
        let seen = SeenList::parse("3, 2,abc,,1");
        assert_eq!(seen.ids(), &[3, 2, 1]);
        assert!(SeenList::parse("").is_empty());
    }

    #[test]
    fn newest_first_and_capped() {
        let mut seen = SeenList::default();
        for id in 0..150 {
            seen.push(id);
        }
        assert_eq!(seen.ids().len(), SeenList::MAX);
        assert_eq!(seen.ids()[0], 149);
        assert_eq!(seen.ids()[99], 50);
    }

    #[test]
    fn display_round_trips_through_cookie_format() {
        let mut seen = SeenList::parse("5,4");
        seen.push(6);
        assert_eq!(seen.to_string(), "6,5,4");
    }
}
