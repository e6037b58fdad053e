//! The refresh loop: periodic sampling interleaved with low-latency key
//! handling, plus the kill sub-protocol.

use std::io;
use std::time::{Duration, Instant};

use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use ratatui::Terminal;

use crate::metrics::{cpu_percent, mem_mb, rank, PrevTotals, ProcessSample, SortKey};
use crate::proc::CounterSource;
use crate::signal::Signaller;
use crate::ui;

/// How many ranked entries the table exposes, regardless of live-process count.
pub const DISPLAY_ROWS: usize = 25;

/// Input is polled at this granularity while waiting out the interval, so a
/// keypress is seen long before the next sample is due.
const POLL_TICK: Duration = Duration::from_millis(100);

pub enum InputMode {
    Normal,
    /// Modal pid entry for the kill command. Sampling is suspended while open.
    KillPrompt,
}

/// What a keypress means for the wait portion of the cycle.
#[derive(Debug, PartialEq, Eq)]
pub enum Cycle {
    Continue,
    /// Abandon the remaining wait and resample now.
    Resample,
    /// Enter the kill prompt.
    Prompt,
    Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PromptOutcome {
    Pending,
    Submitted,
    Cancelled,
}

pub struct App<S: CounterSource> {
    source: S,
    signaller: Box<dyn Signaller>,
    pub interval: Duration,
    pub sort_key: SortKey,
    pub samples: Vec<ProcessSample>,
    prev: PrevTotals,
    pub input_mode: InputMode,
    pub kill_input: String,
    pub status: Option<String>,
}

impl<S: CounterSource> App<S> {
    pub fn new(source: S, signaller: Box<dyn Signaller>, interval: Duration) -> Result<Self> {
        // Seed the system counter so the first cycle diffs a real window.
        // Per-process ticks start empty: first-observed processes show their
        // lifetime average over that window.
        let prev = PrevTotals {
            total_ticks: source.total_ticks()?,
            proc_ticks: Default::default(),
        };
        Ok(Self {
            source,
            signaller,
            interval,
            sort_key: SortKey::Cpu,
            samples: Vec::new(),
            prev,
            input_mode: InputMode::Normal,
            kill_input: String::new(),
            status: None,
        })
    }

    /// One sampling cycle: read counters, derive rates, replace the previous
    /// totals wholesale, rank. Processes that vanish between enumeration and
    /// read are skipped, never an error.
    pub fn sample(&mut self) -> io::Result<()> {
        let cur_total = self.source.total_ticks()?;
        let mut samples = Vec::new();
        for pid in self.source.pids()? {
            let Some(raw) = self.source.process(pid) else {
                continue;
            };
            let prev_ticks = self.prev.proc_ticks.get(&pid).copied().unwrap_or(0);
            samples.push(ProcessSample {
                pid,
                cpu_percent: cpu_percent(raw.total_ticks, prev_ticks, cur_total, self.prev.total_ticks),
                mem_mb: mem_mb(raw.rss_kb),
                name: raw.name,
                total_ticks: raw.total_ticks,
                rss_kb: raw.rss_kb,
            });
        }
        self.prev.proc_ticks = samples.iter().map(|s| (s.pid, s.total_ticks)).collect();
        self.prev.total_ticks = cur_total;
        rank(&mut samples, self.sort_key);
        self.samples = samples;
        Ok(())
    }

    /// The bounded prefix the display gets to see.
    pub fn top_rows(&self) -> &[ProcessSample] {
        &self.samples[..self.samples.len().min(DISPLAY_ROWS)]
    }

    pub fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Cycle {
        match code {
            KeyCode::Char('q') => Cycle::Quit,
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => Cycle::Quit,
            KeyCode::Char('s') => {
                self.sort_key = self.sort_key.toggle();
                Cycle::Resample
            }
            KeyCode::Char('k') => {
                self.kill_input.clear();
                self.input_mode = InputMode::KillPrompt;
                Cycle::Prompt
            }
            _ => Cycle::Continue,
        }
    }

    pub fn handle_prompt_key(&mut self, code: KeyCode) -> PromptOutcome {
        match code {
            KeyCode::Enter => {
                self.submit_kill();
                PromptOutcome::Submitted
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                PromptOutcome::Cancelled
            }
            KeyCode::Backspace => {
                self.kill_input.pop();
                PromptOutcome::Pending
            }
            KeyCode::Char(c) if !c.is_control() => {
                self.kill_input.push(c);
                PromptOutcome::Pending
            }
            _ => PromptOutcome::Pending,
        }
    }

    /// Malformed entries parse to 0, which the signaller rejects.
    fn submit_kill(&mut self) {
        let pid = self.kill_input.trim().parse::<i32>().unwrap_or(0);
        self.status = Some(match self.signaller.terminate(pid) {
            Ok(()) => format!("SIGTERM sent to {pid}"),
            Err(reason) => format!("Failed to kill {pid}: {reason}"),
        });
        self.input_mode = InputMode::Normal;
    }
}

pub fn run_app<B: ratatui::backend::Backend, S: CounterSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> Result<()>
where
    B::Error: std::error::Error + Send + Sync + 'static,
{
    loop {
        app.sample()?;
        terminal.draw(|f| ui::ui(f, app))?;

        let deadline = Instant::now() + app.interval;
        'waiting: loop {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break 'waiting;
            };
            if remaining.is_zero() {
                break 'waiting;
            }
            if !event::poll(remaining.min(POLL_TICK))? {
                continue;
            }
            if let Event::Key(key) = event::read()? {
                match app.handle_key(key.code, key.modifiers) {
                    Cycle::Quit => return Ok(()),
                    Cycle::Resample => break 'waiting,
                    Cycle::Prompt => {
                        if run_prompt(terminal, app)? == PromptOutcome::Submitted {
                            // a completed kill refreshes immediately
                            break 'waiting;
                        }
                        terminal.draw(|f| ui::ui(f, app))?;
                    }
                    Cycle::Continue => {}
                }
            }
        }
    }
}

/// Modal pid entry. This is the one blocking read in the system: the operator
/// gets an unambiguous, echoed line at the cost of suspending the refresh
/// until Enter or Esc.
fn run_prompt<B: ratatui::backend::Backend, S: CounterSource>(
    terminal: &mut Terminal<B>,
    app: &mut App<S>,
) -> Result<PromptOutcome>
where
    B::Error: std::error::Error + Send + Sync + 'static,
{
    loop {
        terminal.draw(|f| ui::ui(f, app))?;
        if let Event::Key(key) = event::read()? {
            match app.handle_prompt_key(key.code) {
                PromptOutcome::Pending => {}
                outcome => return Ok(outcome),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::RawCounters;
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct FakeSource(Rc<RefCell<FakeState>>);

    #[derive(Default)]
    struct FakeState {
        total: u64,
        procs: BTreeMap<i32, RawCounters>,
    }

    impl FakeSource {
        fn set_total(&self, total: u64) {
            self.0.borrow_mut().total = total;
        }

        fn set_proc(&self, pid: i32, ticks: u64, rss_kb: u64) {
            self.0.borrow_mut().procs.insert(
                pid,
                RawCounters {
                    name: format!("proc{pid}"),
                    total_ticks: ticks,
                    rss_kb,
                },
            );
        }

        fn remove_proc(&self, pid: i32) {
            self.0.borrow_mut().procs.remove(&pid);
        }
    }

    impl CounterSource for FakeSource {
        fn total_ticks(&self) -> io::Result<u64> {
            Ok(self.0.borrow().total)
        }

        fn pids(&self) -> io::Result<Vec<i32>> {
            Ok(self.0.borrow().procs.keys().copied().collect())
        }

        fn process(&self, pid: i32) -> Option<RawCounters> {
            self.0.borrow().procs.get(&pid).cloned()
        }
    }

    #[derive(Clone, Default)]
    struct FakeSignaller {
        calls: Rc<RefCell<Vec<i32>>>,
        reject_with: Option<&'static str>,
    }

    impl Signaller for FakeSignaller {
        fn terminate(&self, pid: i32) -> Result<(), String> {
            self.calls.borrow_mut().push(pid);
            match self.reject_with {
                Some(reason) => Err(reason.to_string()),
                None => Ok(()),
            }
        }
    }

    fn new_app(source: &FakeSource, signaller: FakeSignaller) -> App<FakeSource> {
        App::new(source.clone(), Box::new(signaller), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn sampling_diffs_against_the_previous_cycle() {
        let source = FakeSource::default();
        source.set_total(10_000);
        source.set_proc(42, 100, 2048);
        let mut app = new_app(&source, FakeSignaller::default());
        app.sample().unwrap();

        source.set_total(10_500);
        source.set_proc(42, 150, 2048);
        app.sample().unwrap();

        let p = app.samples.iter().find(|s| s.pid == 42).unwrap();
        assert_eq!(p.cpu_percent, 10.0);
        assert_eq!(p.mem_mb, 2.0);
    }

    #[test]
    fn previous_totals_are_replaced_not_merged() {
        let source = FakeSource::default();
        source.set_total(1_000);
        source.set_proc(1, 10, 0);
        source.set_proc(2, 20, 0);
        let mut app = new_app(&source, FakeSignaller::default());
        app.sample().unwrap();

        source.set_total(2_000);
        source.remove_proc(1);
        source.set_proc(3, 30, 0);
        app.sample().unwrap();

        let mut tracked: Vec<i32> = app.prev.proc_ticks.keys().copied().collect();
        tracked.sort_unstable();
        assert_eq!(tracked, [2, 3]);
        assert_eq!(app.prev.total_ticks, 2_000);
    }

    #[test]
    fn display_prefix_is_bounded() {
        let source = FakeSource::default();
        source.set_total(1_000);
        let mut app = new_app(&source, FakeSignaller::default());

        for count in [1usize, 25, 1000] {
            source.0.borrow_mut().procs.clear();
            for pid in 0..count as i32 {
                source.set_proc(pid, pid as u64, 100);
            }
            app.sample().unwrap();
            assert_eq!(app.samples.len(), count);
            assert_eq!(app.top_rows().len(), count.min(DISPLAY_ROWS));
        }
    }

    #[test]
    fn toggle_sort_forces_an_immediate_refresh() {
        let source = FakeSource::default();
        let mut app = new_app(&source, FakeSignaller::default());
        assert_eq!(app.sort_key, SortKey::Cpu);
        assert_eq!(
            app.handle_key(KeyCode::Char('s'), KeyModifiers::NONE),
            Cycle::Resample
        );
        assert_eq!(app.sort_key, SortKey::Mem);
    }

    #[test]
    fn quit_and_unrecognized_keys() {
        let source = FakeSource::default();
        let mut app = new_app(&source, FakeSignaller::default());
        assert_eq!(app.handle_key(KeyCode::Char('q'), KeyModifiers::NONE), Cycle::Quit);
        assert_eq!(
            app.handle_key(KeyCode::Char('c'), KeyModifiers::CONTROL),
            Cycle::Quit
        );
        assert_eq!(app.handle_key(KeyCode::Char('z'), KeyModifiers::NONE), Cycle::Continue);
        assert_eq!(app.handle_key(KeyCode::Up, KeyModifiers::NONE), Cycle::Continue);
    }

    #[test]
    fn malformed_kill_target_is_surfaced_not_fatal() {
        let source = FakeSource::default();
        let signaller = FakeSignaller {
            reject_with: Some("no such process"),
            ..Default::default()
        };
        let calls = signaller.calls.clone();
        let mut app = new_app(&source, signaller);

        assert_eq!(app.handle_key(KeyCode::Char('k'), KeyModifiers::NONE), Cycle::Prompt);
        for c in "abc".chars() {
            assert_eq!(app.handle_prompt_key(KeyCode::Char(c)), PromptOutcome::Pending);
        }
        assert_eq!(app.handle_prompt_key(KeyCode::Enter), PromptOutcome::Submitted);

        assert_eq!(calls.borrow().as_slice(), [0]);
        assert_eq!(
            app.status.as_deref(),
            Some("Failed to kill 0: no such process")
        );
        assert!(matches!(app.input_mode, InputMode::Normal));
    }

    #[test]
    fn successful_kill_reports_the_target() {
        let source = FakeSource::default();
        let signaller = FakeSignaller::default();
        let calls = signaller.calls.clone();
        let mut app = new_app(&source, signaller);

        app.handle_key(KeyCode::Char('k'), KeyModifiers::NONE);
        for c in " 1234 ".chars() {
            app.handle_prompt_key(KeyCode::Char(c));
        }
        app.handle_prompt_key(KeyCode::Enter);

        assert_eq!(calls.borrow().as_slice(), [1234]);
        assert_eq!(app.status.as_deref(), Some("SIGTERM sent to 1234"));
    }

    #[test]
    fn prompt_supports_backspace_and_cancel() {
        let source = FakeSource::default();
        let signaller = FakeSignaller::default();
        let calls = signaller.calls.clone();
        let mut app = new_app(&source, signaller);

        app.handle_key(KeyCode::Char('k'), KeyModifiers::NONE);
        app.handle_prompt_key(KeyCode::Char('1'));
        app.handle_prompt_key(KeyCode::Char('2'));
        app.handle_prompt_key(KeyCode::Backspace);
        assert_eq!(app.kill_input, "1");
        assert_eq!(app.handle_prompt_key(KeyCode::Esc), PromptOutcome::Cancelled);
        assert!(calls.borrow().is_empty());
        assert!(matches!(app.input_mode, InputMode::Normal));
    }
}
