use crate::subtitle::LyricLine;

/// The line under the playhead and the one drawn as its ghost.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActiveLines<'a> {
    pub active_index: Option<usize>,
    pub previous: Option<&'a LyricLine>,
}

impl<'a> ActiveLines<'a> {
    pub fn active<'b>(&self, lines: &'b [LyricLine]) -> Option<&'b LyricLine> {
        self.active_index.and_then(|index| lines.get(index))
    }
}

/// Finds the first line, in sequence order, whose inclusive interval
/// contains `current_time`.
///
/// `previous` is the line right before the active one in sequence order,
/// not the nearest earlier line by time. Out-of-order input therefore shows
/// whatever line happens to precede the active one.
pub fn resolve(lines: &[LyricLine], current_time: f64) -> ActiveLines<'_> {
    let Some(active_index) = lines.iter().position(|line| line.contains(current_time)) else {
        return ActiveLines::default();
    };

    let previous = active_index
        .checked_sub(1)
        .and_then(|index| lines.get(index));
    ActiveLines {
        active_index: Some(active_index),
        previous,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, start_time: f64, end_time: f64) -> LyricLine {
        LyricLine {
            id: id.to_owned(),
            start_time,
            end_time,
            text: id.to_owned(),
        }
    }

    #[test]
    fn resolves_active_and_previous_by_sequence() {
        let lines = vec![line("a", 0.0, 4.0), line("b", 4.1, 8.0)];

        let resolved = resolve(&lines, 5.0);
        assert_eq!(resolved.active_index, Some(1));
        assert_eq!(resolved.previous.map(|l| l.id.as_str()), Some("a"));
        assert_eq!(resolved.active(&lines).map(|l| l.id.as_str()), Some("b"));

        let first = resolve(&lines, 0.0);
        assert_eq!(first.active_index, Some(0));
        assert!(first.previous.is_none());
    }

    #[test]
    fn gap_between_intervals_resolves_to_nothing() {
        let lines = vec![line("a", 0.0, 4.0), line("b", 4.1, 8.0)];
        let resolved = resolve(&lines, 4.05);
        assert!(resolved.active_index.is_none());
        assert!(resolved.previous.is_none());
    }

    #[test]
    fn interval_bounds_are_inclusive() {
        let lines = vec![line("a", 1.0, 2.0)];
        assert_eq!(resolve(&lines, 1.0).active_index, Some(0));
        assert_eq!(resolve(&lines, 2.0).active_index, Some(0));
        assert!(resolve(&lines, 2.0001).active_index.is_none());
    }

    #[test]
    fn first_match_wins_for_overlapping_lines() {
        let lines = vec![
            line("wide", 0.0, 10.0),
            line("tight", 4.0, 5.0),
            line("late", 9.0, 12.0),
        ];
        assert_eq!(resolve(&lines, 4.5).active_index, Some(0));

        let late = resolve(&lines, 11.0);
        assert_eq!(late.active_index, Some(2));
        assert_eq!(late.previous.map(|l| l.id.as_str()), Some("tight"));
    }

    #[test]
    fn previous_follows_sequence_even_when_out_of_time_order() {
        let lines = vec![line("later", 20.0, 25.0), line("earlier", 1.0, 3.0)];
        let resolved = resolve(&lines, 2.0);
        assert_eq!(resolved.active_index, Some(1));
        assert_eq!(resolved.previous.map(|l| l.id.as_str()), Some("later"));
    }

    #[test]
    fn empty_sequence_never_resolves() {
        assert_eq!(resolve(&[], 3.0), ActiveLines::default());
    }
}
