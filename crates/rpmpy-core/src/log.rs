use std::cell::RefCell;
use std::io::IsTerminal;
use std::rc::Rc;

use anstyle::{AnsiColor, Effects, Style};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    fn badge(self) -> &'static str {
        match self {
            Self::Error => "[ERROR]",
            Self::Warn => "[WARN]",
            Self::Info => "[INFO]",
            Self::Debug => "[DEBUG]",
        }
    }

    fn style(self) -> Style {
        match self {
            Self::Error => Style::new()
                .fg_color(Some(AnsiColor::BrightRed.into()))
                .effects(Effects::BOLD),
            Self::Warn => Style::new()
                .fg_color(Some(AnsiColor::BrightYellow.into()))
                .effects(Effects::BOLD),
            Self::Info => Style::new().fg_color(Some(AnsiColor::BrightCyan.into())),
            Self::Debug => Style::new().effects(Effects::DIMMED),
        }
    }
}

#[derive(Clone, Debug)]
enum Sink {
    Stdout,
    Capture(Rc<RefCell<Vec<String>>>),
}

/// Lines recorded by a capturing [`Logger`].
#[derive(Clone, Debug)]
pub struct CapturedLog(Rc<RefCell<Vec<String>>>);

impl CapturedLog {
    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.borrow().iter().any(|line| line.contains(needle))
    }
}

/// Level-prefixed diagnostics on stdout.
///
/// Built once from configuration and handed to every component; `[DEBUG]`
/// lines are only emitted in verbose mode.
#[derive(Clone, Debug)]
pub struct Logger {
    verbose: bool,
    style: OutputStyle,
    sink: Sink,
}

impl Logger {
    pub fn new(verbose: bool, style: OutputStyle) -> Self {
        Self {
            verbose,
            style,
            sink: Sink::Stdout,
        }
    }

    pub fn capturing(verbose: bool) -> (Self, CapturedLog) {
        let lines = Rc::new(RefCell::new(Vec::new()));
        let logger = Self {
            verbose,
            style: OutputStyle::Plain,
            sink: Sink::Capture(Rc::clone(&lines)),
        };
        (logger, CapturedLog(lines))
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn style(&self) -> OutputStyle {
        self.style
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.emit(Level::Error, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.emit(Level::Warn, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.emit(Level::Info, message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        if self.verbose {
            self.emit(Level::Debug, message.as_ref());
        }
    }

    fn emit(&self, level: Level, message: &str) {
        match &self.sink {
            Sink::Stdout => println!("{}", render_log_line(self.style, level, message)),
            Sink::Capture(lines) => lines
                .borrow_mut()
                .push(render_log_line(OutputStyle::Plain, level, message)),
        }
    }
}

pub fn render_log_line(style: OutputStyle, level: Level, message: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{} {message}", level.badge()),
        OutputStyle::Rich => {
            let badge_style = level.style();
            format!(
                "{}{}{} {message}",
                badge_style.render(),
                level.badge(),
                badge_style.render_reset()
            )
        }
    }
}

pub fn current_output_style() -> OutputStyle {
    if std::env::var_os("NO_COLOR").is_some() || !std::io::stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}
