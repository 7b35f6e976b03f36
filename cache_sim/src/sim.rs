use std::fmt;

use thiserror::Error;

use crate::{
    bin,
    breakpoint::BreakPoint,
    common::{ExecuteMode, SimulationOption},
    config::HierarchyConfig,
    hierarchy::{AccessOutcome, HierarchyController},
    io::{Output, OutputError},
    level::CacheLevel,
    trace::{TraceError, TraceEvent, TraceItem},
};

cfg_if::cfg_if! {
    if #[cfg(feature = "stat")] {
        use crate::stat::{AddStats, Stats};
        pub use self::stat::SimReport;
    }
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

pub type Result<T> = std::result::Result<T, SimError>;

pub enum BreakReason {
    StepEnded,
    /// the access has not been applied yet
    BreakPoint(BreakPoint, TraceEvent),
}

pub enum ControlFlow {
    Break(BreakReason),
    Exit,
}

/// why the simulator stopped consuming the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEnd {
    Eof,
    Malformed { line: usize, content: String },
}

impl fmt::Display for TraceEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceEnd::Eof => write!(f, "end of trace"),
            TraceEnd::Malformed { line, content } => {
                write!(f, "malformed line {line}: `{content}`")
            }
        }
    }
}

/// Replays a trace through the hierarchy, one access at a time.
pub struct Simulator<T, O> {
    hierarchy: HierarchyController,
    config: HierarchyConfig,
    trace: T,
    pending: Option<TraceEvent>,
    output: O,
    accesses: usize,
    end: Option<TraceEnd>,
    /// the pending access is the one the last breakpoint stopped at
    resume_at_break: bool,
    #[cfg(feature = "stat")]
    stat_builder: stat::SimStatBuilder,
}

pub struct SimOutput<O> {
    pub output: O,
    pub accesses: usize,
    pub end: Option<TraceEnd>,
}

impl<T, O> Simulator<T, O>
where
    T: Iterator<Item = TraceItem>,
    O: Output,
{
    pub fn new(config: HierarchyConfig, trace: T, output: O) -> Self {
        Self {
            hierarchy: HierarchyController::new(config.l1.geometry, config.l2.geometry),
            config,
            trace,
            pending: None,
            output,
            accesses: 0,
            end: None,
            resume_at_break: false,
            #[cfg(feature = "stat")]
            stat_builder: stat::SimStatBuilder::new(),
        }
    }

    pub fn hierarchy(&self) -> &HierarchyController {
        &self.hierarchy
    }
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }
    /// number of accesses applied so far.
    pub fn accesses(&self) -> usize {
        self.accesses
    }
    pub fn end(&self) -> Option<&TraceEnd> {
        self.end.as_ref()
    }

    /// L1 block address of `addr`; breakpoints are keyed by it.
    pub fn block_of(&self, addr: u32) -> u32 {
        addr & !bin::low_mask(self.hierarchy.l1().geometry().offset_bits())
    }

    /// the access that will be applied next, if the trace has one.
    pub fn peek(&mut self) -> Result<Option<TraceEvent>> {
        if self.pending.is_none() && self.end.is_none() {
            match self.trace.next() {
                Some(Ok(e)) => self.pending = Some(e),
                Some(Err(TraceError::Format { line, content })) => {
                    log::warn!("stopping at trace line {line}: `{content}` is not `<R|W> <hex address>`");
                    self.end = Some(TraceEnd::Malformed { line, content });
                }
                Some(Err(e)) => return Err(e.into()),
                None => self.end = Some(TraceEnd::Eof),
            }
        }
        Ok(self.pending)
    }

    fn apply(&mut self, event: TraceEvent, do_trace: bool) -> Result<AccessOutcome> {
        let outcome = self.hierarchy.access(event.kind, event.addr);
        self.output.record(&outcome)?;
        self.accesses += 1;
        if do_trace {
            println!(
                "#{:08} {event}\tL1: {}  L2: {}",
                self.accesses, outcome.l1, outcome.l2
            );
        }
        Ok(outcome)
    }

    pub fn exit_sim(&mut self) -> Result<()> {
        self.output.finish()?;
        #[cfg(feature = "stat")]
        {
            self.stat_builder.accesses(self.accesses);
            self.stat_builder.end(self.end.clone());
            self.stat_builder.stop_timer();
        }
        log::info!(
            "simulated {} accesses ({})",
            self.accesses,
            self.end.as_ref().unwrap_or(&TraceEnd::Eof)
        );
        Ok(())
    }

    /// advances according to `opt.mode`. a breakpoint stops before its access is applied;
    /// the next call applies that access without stopping again.
    pub fn single_step(&mut self, opt: &SimulationOption) -> Result<ControlFlow> {
        let mut is_enter = std::mem::take(&mut self.resume_at_break);
        let mut remaining = match &opt.mode {
            ExecuteMode::Run => None,
            ExecuteMode::RunStep(r) => Some(r.get_step()),
        };
        loop {
            if remaining == Some(0) {
                return Ok(ControlFlow::Break(BreakReason::StepEnded));
            }
            let Some(event) = self.peek()? else {
                self.exit_sim()?;
                return Ok(ControlFlow::Exit);
            };
            if !is_enter {
                if let Some(bp) = opt.breakpoints.get(&self.block_of(event.addr)) {
                    if bp.matches(self.block_of(event.addr), &event) {
                        self.resume_at_break = true;
                        return Ok(ControlFlow::Break(BreakReason::BreakPoint(*bp, event)));
                    }
                }
            }
            is_enter = false;
            self.pending = None;
            self.apply(event, opt.do_trace)?;
            if let Some(n) = remaining.as_mut() {
                *n -= 1;
            }
        }
    }

    /// replays the whole trace.
    pub fn run(&mut self) -> Result<()> {
        let opt = SimulationOption::default();
        loop {
            if let ControlFlow::Exit = self.single_step(&opt)? {
                break Ok(());
            }
        }
    }

    pub fn into_output(self) -> SimOutput<O> {
        SimOutput {
            output: self.output,
            accesses: self.accesses,
            end: self.end,
        }
    }
}

impl<T, O> Simulator<T, O> {
    #[cfg(feature = "stat")]
    pub fn collect_stat(&self) -> Stats {
        let mut ss = Stats::default();
        self.add_stats(&mut ss);
        ss
    }
    #[cfg(feature = "stat")]
    pub fn report(&self) -> SimReport {
        let (l1, l2) = self.hierarchy.level_stats();
        let sim = self.stat_builder.finish();
        SimReport {
            accesses: self.accesses,
            truncated_at_line: match &self.end {
                Some(TraceEnd::Malformed { line, .. }) => Some(*line),
                _ => None,
            },
            elapsed_ms: sim.elapsed_ms(),
            l1,
            l2,
        }
    }
}

#[cfg(feature = "stat")]
impl<T, O> AddStats for Simulator<T, O> {
    fn add_stats(&self, buf: &mut Stats) {
        buf.push(Box::new(self.stat_builder.finish()));
        self.hierarchy.add_stats(buf);
    }
}

#[cfg(feature = "stat")]
mod stat {
    use std::{fmt, io::Write, time};

    use serde::Serialize;

    use super::TraceEnd;
    use crate::{hierarchy::stat::LevelStat, stat::*};

    pub struct SimStatBuilder {
        begin: time::Instant,
        accesses: Option<usize>,
        end: Option<TraceEnd>,
        elapsed: Option<time::Duration>,
    }

    impl SimStatBuilder {
        pub fn new() -> Self {
            Self {
                begin: time::Instant::now(),
                accesses: None,
                end: None,
                elapsed: None,
            }
        }
        pub fn accesses(&mut self, accesses: usize) {
            self.accesses = Some(accesses)
        }
        pub fn end(&mut self, end: Option<TraceEnd>) {
            self.end = end
        }
        pub fn stop_timer(&mut self) {
            self.elapsed = Some(time::Instant::now() - self.begin)
        }
        /// fields not recorded yet are reported as of now.
        pub fn finish(&self) -> SimStat {
            SimStat {
                accesses: self.accesses.unwrap_or(0),
                end: self.end.clone(),
                elapsed: self.elapsed.unwrap_or_else(|| self.begin.elapsed()),
            }
        }
    }

    impl Default for SimStatBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct SimStat {
        accesses: usize,
        end: Option<TraceEnd>,
        elapsed: time::Duration,
    }

    impl SimStat {
        pub fn elapsed_ms(&self) -> u128 {
            self.elapsed.as_millis()
        }
    }

    impl Stat for SimStat {
        fn view(&self, _: usize) -> Box<dyn StatView + '_> {
            Box::new(self)
        }
    }

    impl StatView for &'_ SimStat {
        fn header(&self) -> &'static str {
            "simulator stat"
        }
        fn width(&self) -> usize {
            33
        }
    }

    impl fmt::Display for &'_ SimStat {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let ms = format!("{} ms", self.elapsed.as_millis());
            writeln!(f, "  elapsed total: {ms:>12}")?;
            let accesses = format!("#{}", self.accesses);
            writeln!(f, "  accesses total: {accesses:>11}")?;
            match &self.end {
                Some(TraceEnd::Malformed { line, .. }) => {
                    write!(f, "  trace truncated at line {line}")
                }
                Some(TraceEnd::Eof) => write!(f, "  trace fully consumed"),
                None => write!(f, "  trace in progress"),
            }
        }
    }

    /// Machine-readable summary of a run.
    #[derive(Debug, Serialize)]
    pub struct SimReport {
        pub accesses: usize,
        pub truncated_at_line: Option<usize>,
        pub elapsed_ms: u128,
        pub l1: LevelStat,
        pub l2: LevelStat,
    }

    impl SimReport {
        pub fn write_json<W: Write>(&self, w: W) -> serde_json::Result<()> {
            serde_json::to_writer_pretty(w, self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        breakpoint::BreakPoint,
        common::{AccessKindMask, RunStep},
        hierarchy::AccessState::*,
        io::{TextOutput, VecOutput},
        trace::TraceReader,
    };

    const CONFIG: &str = "L1 32 1 8\nL2 32 4 64\n";

    fn simulator(trace: &str) -> Simulator<TraceReader<&[u8]>, VecOutput> {
        let config = HierarchyConfig::parse(CONFIG).unwrap();
        Simulator::new(config, TraceReader::new(trace.as_bytes()), VecOutput::new())
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut sim = simulator("R 0x00000000\nR 0x00000000\nW 0x00000020\nR 0x00000000\n");
        sim.run().unwrap();
        let out = sim.into_output();
        assert_eq!(Some(TraceEnd::Eof), out.end);
        assert_eq!(
            vec![
                (ReadMiss, ReadMiss),
                (ReadHit, NoAction),
                (WriteMiss, WriteMiss),
                (ReadHit, NoAction)
            ],
            out.output.into_inner()
        );
    }

    #[test]
    fn test_end_to_end_text() {
        let config = HierarchyConfig::parse(CONFIG).unwrap();
        let trace = "R 0x00000000\nR 0x00000000\nW 0x00000020\nR 0x00000000\n";
        let mut sim = Simulator::new(
            config,
            TraceReader::new(trace.as_bytes()),
            TextOutput::new(Vec::new()),
        );
        sim.run().unwrap();
        let text = String::from_utf8(sim.into_output().output.into_inner()).unwrap();
        assert_eq!("2 2\n1 0\n4 4\n1 0\n", text);
    }

    #[test]
    fn test_first_line_is_miss_at_both() {
        let mut sim = simulator("R 0x00000000\n");
        sim.run().unwrap();
        assert_eq!(
            &[(ReadMiss, ReadMiss)],
            sim.into_output().output.as_slice()
        );
    }

    #[test]
    fn test_malformed_line_truncates() {
        let mut sim = simulator("R 0x0\nR 0x0\nZ 0x0\nR 0x40\n");
        sim.run().unwrap();
        let out = sim.into_output();
        assert_eq!(2, out.accesses);
        assert_eq!(
            Some(TraceEnd::Malformed {
                line: 3,
                content: "Z 0x0".to_owned()
            }),
            out.end
        );
        assert_eq!(2, out.output.as_slice().len());
    }

    #[test]
    fn test_step_and_breakpoint() {
        let mut sim = simulator("R 0x0\nR 0x100\nW 0x104\nR 0x200\n");
        let mut opt = SimulationOption {
            mode: ExecuteMode::RunStep(RunStep::new(Some(1))),
            ..Default::default()
        };
        assert!(matches!(
            sim.single_step(&opt).unwrap(),
            ControlFlow::Break(BreakReason::StepEnded)
        ));
        assert_eq!(1, sim.accesses());

        opt.mode = ExecuteMode::Run;
        opt.breakpoints
            .insert(0x100, BreakPoint::new(0x100, AccessKindMask::Write));
        match sim.single_step(&opt).unwrap() {
            ControlFlow::Break(BreakReason::BreakPoint(bp, event)) => {
                assert_eq!(0x100, bp.addr);
                assert_eq!(TraceEvent::write(0x104), event);
            }
            _ => panic!("expected breakpoint"),
        }
        // the read of the same block did not trigger and the write is still pending
        assert_eq!(2, sim.accesses());
        assert_eq!(Some(TraceEvent::write(0x104)), sim.peek().unwrap());

        assert!(matches!(sim.single_step(&opt).unwrap(), ControlFlow::Exit));
        assert_eq!(4, sim.accesses());
    }

    #[test]
    fn test_breakpoint_on_first_access() {
        let mut sim = simulator("W 0x40\nR 0x0\n");
        let mut opt = SimulationOption::default();
        opt.breakpoints
            .insert(0x40, BreakPoint::new(0x40, AccessKindMask::all()));
        assert!(matches!(
            sim.single_step(&opt).unwrap(),
            ControlFlow::Break(BreakReason::BreakPoint(..))
        ));
        assert_eq!(0, sim.accesses());
        assert!(matches!(sim.single_step(&opt).unwrap(), ControlFlow::Exit));
        assert_eq!(2, sim.accesses());
    }

    #[test]
    fn test_invalid_utf8_line_truncates() {
        let config = HierarchyConfig::parse(CONFIG).unwrap();
        let trace: &[u8] = b"R 0x0\nR \xff\xfe\nR 0x40\n";
        let mut sim = Simulator::new(config, TraceReader::new(trace), VecOutput::new());
        sim.run().unwrap();
        let out = sim.into_output();
        assert_eq!(1, out.accesses);
        assert!(matches!(out.end, Some(TraceEnd::Malformed { line: 2, .. })));
    }

    #[cfg(feature = "stat")]
    #[test]
    fn test_report() {
        let mut sim = simulator("R 0x0\nR 0x0\nW 0x20\nbad\n");
        sim.run().unwrap();
        let report = sim.report();
        assert_eq!(3, report.accesses);
        assert_eq!(Some(4), report.truncated_at_line);
        assert_eq!(1, report.l1.read_hits);
        assert_eq!(1, report.l2.write_misses);
        let mut buf = Vec::new();
        report.write_json(&mut buf).unwrap();
        let json = String::from_utf8(buf).unwrap();
        assert!(json.contains("\"truncated_at_line\": 4"), "{json}");
        let stats = sim.collect_stat();
        assert_eq!(3, stats.len());
    }
}
