use std::fmt;

pub trait Width {
    fn width_by_chunk_size(chunk_size: usize) -> usize;
    fn chunk_size(max_width: usize) -> usize {
        let mut chunk_size = 2;
        loop {
            if Self::width_by_chunk_size(chunk_size) > max_width {
                break chunk_size - 1;
            }
            chunk_size += 1;
        }
    }
}

pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// header of stat
    fn header(&self) -> &'static str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// add stat to `buf`.
    fn add_stats(&self, buf: &mut Stats);
}

#[derive(Default)]
pub struct Stats {
    stats: Vec<Box<dyn Stat>>,
}

impl Stats {
    pub fn push(&mut self, stat: Box<dyn Stat>) {
        self.stats.push(stat)
    }
    pub fn len(&self) -> usize {
        self.stats.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
}

impl Stats {
    pub fn view(&self, max_width: usize) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view(max_width)).collect(),
        }
    }
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(0);
        writeln!(f, "{:-^width$}", " statistics ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            writeln!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

/// `part` as a percentage of `total`, 0 when nothing was counted.
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.
    } else {
        100. * part as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl Stat for Fixed {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(FixedView(self.0))
        }
    }

    struct FixedView(&'static str);

    impl StatView for FixedView {
        fn header(&self) -> &'static str {
            "fixed"
        }
        fn width(&self) -> usize {
            self.0.len()
        }
    }

    impl fmt::Display for FixedView {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    struct Columns;

    impl Width for Columns {
        fn width_by_chunk_size(chunk_size: usize) -> usize {
            chunk_size * 10
        }
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(4, Columns::chunk_size(45));
        assert_eq!(5, Columns::chunk_size(50));
    }
    #[test]
    fn test_all_view() {
        let mut ss = Stats::default();
        ss.push(Box::new(Fixed("0123456789abcdef")));
        let s = ss.view(80).to_string();
        let lines: Vec<_> = s.lines().collect();
        assert_eq!("-- statistics --", lines[0]);
        assert_eq!("fixed:", lines[1]);
        assert_eq!("0123456789abcdef", lines[2]);
        assert_eq!("-".repeat(16), lines[3]);
    }
    #[test]
    fn test_percent() {
        assert_eq!(0., percent(3, 0));
        assert_eq!(25., percent(1, 4));
    }
}
