//! Run statistics, rendered as titled blocks.

use std::fmt;

pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// title of the block
    fn header(&self) -> &'static str;
    /// widest body line
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// appends this component's stats to `buf`.
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
    pub fn view(&self, max_width: usize) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view(max_width)).collect(),
            max_width,
        }
    }
}

impl Extend<Box<dyn Stat>> for Stats {
    fn extend<T: IntoIterator<Item = Box<dyn Stat>>>(&mut self, iter: T) {
        self.stats.extend(iter)
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
    max_width: usize,
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(0)
            .min(self.max_width);
        writeln!(f, "{:-^width$}", " statistics ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            writeln!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl Stat for Fixed {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(FixedView)
        }
    }

    struct FixedView;

    impl StatView for FixedView {
        fn header(&self) -> &'static str {
            "fixed"
        }
        fn width(&self) -> usize {
            20
        }
    }

    impl fmt::Display for FixedView {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "  body")
        }
    }

    #[test]
    fn test_all_view_border() {
        let mut stats = Stats::default();
        stats.push(Box::new(Fixed));
        let s = stats.view(80).to_string();
        let lines: Vec<_> = s.lines().collect();
        assert_eq!("---- statistics ----", lines[0]);
        assert_eq!(vec!["fixed:", "  body"], lines[1..3]);
        assert_eq!("-".repeat(20), lines[3]);
    }
}
