use std::cell::RefCell;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use rpmpy_core::{remote_file_name, OutputStyle};
use rpmpy_installer::InstallState;
use rpmpy_source::{DownloadProgress, ProgressHook};

struct ActiveDownload {
    label: String,
    downloaded: u64,
    progress_bar: ProgressBar,
    started_at: Instant,
}

/// Progress bar for archive downloads. Plain output gets no hook; the
/// locator's own log lines are enough there.
pub fn download_progress_hook(style: OutputStyle) -> Option<ProgressHook> {
    if style == OutputStyle::Plain {
        return None;
    }

    let active: RefCell<Option<ActiveDownload>> = RefCell::new(None);
    Some(Box::new(move |event: DownloadProgress| match event {
        DownloadProgress::Started { url, total } => {
            let label = remote_file_name(&url).unwrap_or("archive").to_string();
            let progress_bar = start_progress_bar(&label, total);
            *active.borrow_mut() = Some(ActiveDownload {
                label,
                downloaded: 0,
                progress_bar,
                started_at: Instant::now(),
            });
        }
        DownloadProgress::Advanced { downloaded } => {
            if let Some(download) = active.borrow_mut().as_mut() {
                download.downloaded = downloaded;
                download.progress_bar.set_position(downloaded);
            }
        }
        DownloadProgress::Finished => {
            if let Some(download) = active.borrow_mut().take() {
                download.progress_bar.finish_and_clear();
                if let Some(line) = render_download_line(
                    style,
                    &download.label,
                    download.downloaded,
                    Some(download.started_at.elapsed()),
                ) {
                    println!("{line}");
                }
            }
        }
    }))
}

fn start_progress_bar(label: &str, total: Option<u64>) -> ProgressBar {
    let (progress_bar, template) = match total {
        Some(total) => (
            ProgressBar::new(total.max(1)),
            "{spinner:.cyan.bold} {msg} [{bar:24.cyan/blue}] {bytes}/{total_bytes} {elapsed_precise}",
        ),
        None => (
            ProgressBar::new_spinner(),
            "{spinner:.cyan.bold} {msg} {bytes} {elapsed_precise}",
        ),
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        progress_bar.set_style(style.tick_chars("|/-\\ ").progress_chars("=>-"));
    }
    progress_bar.set_message(label.to_string());
    progress_bar.enable_steady_tick(Duration::from_millis(80));
    progress_bar
}

/// Summary line printed once a download completes, rich output only.
pub fn render_download_line(
    style: OutputStyle,
    label: &str,
    downloaded: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }
    let suffix = elapsed
        .map(|value| format!(" in {}", format_elapsed(value)))
        .unwrap_or_default();
    Some(format!(
        "{} {}{}",
        colorize(download_label_style(), label),
        HumanBytes(downloaded),
        suffix
    ))
}

pub fn outcome_message(state: InstallState) -> &'static str {
    match state {
        InstallState::Installed => "RPM Python binding built and installed.",
        InstallState::InstalledFromBinaryPackage => {
            "RPM Python binding installed from the binary package."
        }
        InstallState::Skipped => "Nothing to install.",
        InstallState::Failed => "Installation failed.",
        _ => "Installation stopped before completion.",
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn download_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
