use std::io::{stdin, stdout, Write};

use anyhow::Result;
use bitmask_enum::bitmask;
use cache_sim::{
    breakpoint::BreakPoint,
    common::{AccessKindMask, ExecuteMode, RunStep, SimulationOption},
    io::Output,
    level::CacheLevel,
    set::CacheSet,
    sim::{BreakReason, ControlFlow, Simulator},
    trace::TraceItem,
};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

peg::parser!(grammar command() for str {
    rule usize() -> usize
        = n:$(quiet!{['0'..='9']+}) {? n.parse().map_err(|_| "usize") }
        / expected!("usize")
    rule addr() -> u32
        = quiet!{"0" ['x' | 'X']} n:$(quiet!{['0'..='9'|'a'..='f'|'A'..='F']+})
        {? u32::from_str_radix(n, 16).map_err(|_| "32-bit address") }
        / n:$(quiet!{['0'..='9']+}) {? n.parse().map_err(|_| "32-bit address") }
        / expected!("address")

    rule bp() = "bp" / "breakpoint"
    rule rm() = "rm" / "remove"
    rule read() = "read" / "r"
    rule write() = "write" / "w"
    rule access_kind() -> AccessKindMask
        = "rw" { AccessKindMask::all() }
        / read() { AccessKindMask::Read }
        / write() { AccessKindMask::Write }
    rule kind_arg() -> AccessKindMask = k:access_kind() __ { k }
    rule step_count() -> usize = __ n:usize() { n }
    rule level_arg() -> ShowLevel
        = "l1" __ { ShowLevel::L1 }
        / "l2" __ { ShowLevel::L2 }
    rule dyn_command() -> ExecuteMode
        = ("run" / "continue") { ExecuteMode::Run }
        / "step" step:step_count()? { ExecuteMode::RunStep(RunStep::new(step)) }
    rule static_command() -> StaticCommand
        = "trace" __ "off" { StaticCommand::UpdateWhetherTrace(false) }
        / "trace" (__ "on")? { StaticCommand::UpdateWhetherTrace(true) }
        / bp() __ rm() __ addr:addr() { StaticCommand::RemoveBp(addr) }
        / bp() __ kind:kind_arg()? addr:addr() {
            StaticCommand::AddBp(kind.unwrap_or(AccessKindMask::all()), addr)
        }
        / "show" __ sk:show_kind() { StaticCommand::Show(sk) }
    rule show_kind() -> ShowKind
        = "next" { ShowKind::Next }
        / bp() { ShowKind::AllBp }
        / "stat" { ShowKind::Stat }
        / "config" { ShowKind::Config }
        / "set" __ level:level_arg()? index:usize() {
            ShowKind::Set(level.unwrap_or(ShowLevel::all()), index)
        }
    pub(crate) rule parse_command() -> Command
        = _ s:static_command() _ { Command::Static(s) }
        / _ ("exit" / "quit") _ { Command::Exit }
        / _ d:dyn_command()? _ { Command::Dynamic(d) }
        / expected!("command")

    rule ws() = quiet!{[' ' | '\t' | '\r' | '\n']}
        / expected!("whitespace")
    rule _() = ws()*
    rule __() = ws()+
});

pub(crate) enum Command {
    Dynamic(Option<ExecuteMode>),
    Static(StaticCommand),
    Exit,
}

pub(crate) enum StaticCommand {
    UpdateWhetherTrace(bool),
    Show(ShowKind),
    /// address as typed; keyed by its L1 block once added
    AddBp(AccessKindMask, u32),
    RemoveBp(u32),
}

pub(crate) enum ShowKind {
    Next,
    Config,
    Stat,
    AllBp,
    IsTraceEnabled,
    Set(ShowLevel, usize),
}

#[bitmask(u8)]
pub(crate) enum ShowLevel {
    L1,
    L2,
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}

fn print_set(label: &str, index: usize, set: &CacheSet) {
    println!("{label} set #{index}:");
    for (way, line) in set.lines().iter().enumerate() {
        let victim = if way == set.cursor() { "  <- next victim" } else { "" };
        println!("  way {way:>3}: {line}{victim}");
    }
}

pub fn execute_interactive(
    sim: &mut Simulator<impl Iterator<Item = TraceItem>, impl Output>,
) -> Result<()> {
    let mut opt = SimulationOption::default();
    #[cfg(feature = "stat")]
    let width = get_terminal_width();
    println!("entering interactive.");
    'interactive: loop {
        let mut show = None;
        let update_mode = 'input: loop {
            if let Some(show) = show.take() {
                match show {
                    ShowKind::Next => match sim.peek()? {
                        Some(e) => {
                            let block = sim.block_of(e.addr);
                            println!("next #{}: {e} (block {block:#010x})", sim.accesses() + 1);
                        }
                        None => match sim.end() {
                            Some(end) => println!("no more accesses: {end}"),
                            None => println!("no more accesses."),
                        },
                    },
                    ShowKind::Config => {
                        println!("{}", sim.config());
                    }
                    ShowKind::IsTraceEnabled => {
                        println!(
                            "trace {}",
                            if opt.do_trace { "enabled" } else { "disabled" }
                        );
                    }
                    #[cfg(feature = "stat")]
                    ShowKind::Stat => {
                        println!("{}", sim.collect_stat().view(width.unwrap_or(60) as usize));
                    }
                    #[cfg(not(feature = "stat"))]
                    ShowKind::Stat => {
                        println!("statistics unavailable; try compile with `--features stat`");
                    }
                    ShowKind::AllBp => {
                        let mut v: Vec<_> = opt.breakpoints.iter().collect();
                        if v.is_empty() {
                            println!("no breakpoints set.");
                        } else {
                            print!("breakpoints: ");
                            v.sort_by_key(|(a, _)| *a);
                            println!(
                                "[{}]",
                                v.into_iter()
                                    .map(|(_, b)| format!("{b}"))
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            );
                        }
                    }
                    ShowKind::Set(levels, index) => {
                        let config = sim.config();
                        let hierarchy = sim.hierarchy();
                        for (level, label, cache) in [
                            (ShowLevel::L1, &config.l1.label, hierarchy.l1()),
                            (ShowLevel::L2, &config.l2.label, hierarchy.l2()),
                        ] {
                            if !levels.contains(level) {
                                continue;
                            }
                            match cache.set(index) {
                                Some(set) => print_set(label, index, set),
                                None => println!(
                                    "{label} has no set #{index} ({} sets)",
                                    cache.geometry().sets_count()
                                ),
                            }
                        }
                    }
                }
            }
            // prompt string
            match &opt.mode {
                ExecuteMode::Run => print!("run "),
                ExecuteMode::RunStep(n) => print!("step {} ", n.get_step()),
            }
            if opt.do_trace {
                print!("[trace] ");
            }
            print!("> ");
            stdout().flush()?;
            let mut str = String::new();
            if stdin().read_line(&mut str)? == 0 {
                sim.exit_sim()?;
                break 'interactive;
            }
            let parsed = match command::parse_command(&str) {
                Ok(p) => p,
                Err(e) => {
                    println!("parse error: expected {}", e.expected);
                    continue;
                }
            };
            match parsed {
                Command::Dynamic(d) => {
                    break 'input d;
                }
                Command::Static(s) => {
                    match s {
                        StaticCommand::Show(s) => show = Some(s),
                        StaticCommand::UpdateWhetherTrace(b) => {
                            opt.do_trace = b;
                            show = Some(ShowKind::IsTraceEnabled);
                        }
                        StaticCommand::AddBp(kind, addr) => {
                            let block = sim.block_of(addr);
                            opt.breakpoints.insert(block, BreakPoint::new(block, kind));
                            show = Some(ShowKind::AllBp);
                        }
                        StaticCommand::RemoveBp(addr) => {
                            opt.breakpoints.remove(&sim.block_of(addr));
                            show = Some(ShowKind::AllBp);
                        }
                    };
                    continue 'input;
                }
                Command::Exit => {
                    sim.exit_sim()?;
                    break 'interactive;
                }
            }
        };
        if let Some(mode) = update_mode {
            println!("mode: {mode}");
            opt.mode = mode;
        }
        match sim.single_step(&opt)? {
            ControlFlow::Break(reason) => {
                if let BreakReason::BreakPoint(bp, event) = reason {
                    println!("reached {bp}: {event} not applied yet");
                }
                continue;
            }
            ControlFlow::Exit => {
                match sim.end() {
                    Some(end) => println!("trace halts: {end}"),
                    None => println!("trace halts"),
                }
                break 'interactive;
            }
        }
    }
    println!("exiting interactive.");
    Ok(())
}
