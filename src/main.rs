use std::{io, time::Duration};

use clap::Parser;
use color_eyre::Result;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

mod app;
mod metrics;
mod proc;
mod signal;
mod ui;

use app::App;
use proc::ProcSource;
use signal::Sigterm;

#[derive(Parser, Debug)]
#[command(
    name = "ptop",
    about = "Live terminal dashboard of per-process CPU and memory usage",
    version
)]
struct Args {
    /// Refresh interval in whole seconds
    #[arg(default_value_t = 2, value_parser = clap::value_parser!(u64).range(1..))]
    interval: u64,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Fails before the terminal is touched if /proc is unreadable.
    let mut app = App::new(
        ProcSource::new("/proc"),
        Box::new(Sigterm),
        Duration::from_secs(args.interval),
    )?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = app::run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("{err:?}");
    }

    Ok(())
}
