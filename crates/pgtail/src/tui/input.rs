//! Key handling and command-line parsing for the tail session.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use pgtail_core::export::ExportFormat;
use pgtail_core::runtime::{Command, TimeWindow};
use pgtail_core::stats::SlowQueryConfig;

use super::app::{AppState, InputMode};

/// What the app loop should do after a key event.
pub enum KeyAction {
    None,
    Quit,
    /// Send a runtime command.
    Run(Command),
    /// Show a one-line message in the status bar.
    Message(String),
}

/// Handle a key event against the current input mode.
pub fn handle_key(state: &mut AppState, key: KeyEvent) -> KeyAction {
    match state.input_mode {
        InputMode::Normal => handle_normal_key(state, key),
        InputMode::Command => handle_command_key(state, key),
    }
}

fn handle_normal_key(state: &mut AppState, key: KeyEvent) -> KeyAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return KeyAction::Quit;
    }

    match key.code {
        KeyCode::Char('q') => KeyAction::Quit,
        KeyCode::Up | KeyCode::Char('k') => KeyAction::Run(Command::Scroll(1)),
        KeyCode::Down | KeyCode::Char('j') => KeyAction::Run(Command::Scroll(-1)),
        KeyCode::PageUp => KeyAction::Run(Command::Scroll(state.page_height as i64)),
        KeyCode::PageDown => KeyAction::Run(Command::Scroll(-(state.page_height as i64))),
        KeyCode::Home | KeyCode::Char('g') => KeyAction::Run(Command::JumpHome),
        KeyCode::End | KeyCode::Char('G') => KeyAction::Run(Command::JumpEnd),
        KeyCode::Char('f') => KeyAction::Run(Command::Follow),
        KeyCode::Char(' ') | KeyCode::Char('p') => KeyAction::Run(Command::Pause),
        KeyCode::Char(':') => {
            state.input_mode = InputMode::Command;
            state.command_input.clear();
            KeyAction::None
        }
        _ => KeyAction::None,
    }
}

fn handle_command_key(state: &mut AppState, key: KeyEvent) -> KeyAction {
    match key.code {
        KeyCode::Esc => {
            state.input_mode = InputMode::Normal;
            state.command_input.clear();
            KeyAction::None
        }
        KeyCode::Enter => {
            let line = std::mem::take(&mut state.command_input);
            state.input_mode = InputMode::Normal;
            parse_command_line(&line)
        }
        KeyCode::Backspace => {
            state.command_input.pop();
            KeyAction::None
        }
        KeyCode::Char(c) => {
            state.command_input.push(c);
            KeyAction::None
        }
        _ => KeyAction::None,
    }
}

/// Parse a `:` command line into a runtime command.
///
/// Grammar (one command per line):
///   levels SPEC | /regex/ | +/r/ | -/r/ | &/r/ | nofilter
///   since T | until T | between A B | notime
///   field NAME=VALUE | nofield NAME
///   clear [force] | pause | follow
///   slow WARN SLOW CRITICAL | highlight NAME on|off | resethl
///   export PATH [text|json|csv] [markup] | pipe COMMAND...
///   errors clear | connections clear
pub fn parse_command_line(line: &str) -> KeyAction {
    let line = line.trim();
    if line.is_empty() {
        return KeyAction::None;
    }

    // Bare regex tokens work without a keyword.
    if line.starts_with(['/', '+', '-', '&']) {
        return KeyAction::Run(Command::SetRegex(line.to_string()));
    }

    let mut parts = line.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    match (head, rest.as_slice()) {
        ("levels", args) if !args.is_empty() => {
            KeyAction::Run(Command::SetLevels(args.join(",")))
        }
        ("nofilter", []) => KeyAction::Run(Command::ClearRegex),
        ("since", [time]) => {
            KeyAction::Run(Command::SetTimeWindow(TimeWindow::Since(time.to_string())))
        }
        ("until", [time]) => {
            KeyAction::Run(Command::SetTimeWindow(TimeWindow::Until(time.to_string())))
        }
        ("between", [a, b]) => KeyAction::Run(Command::SetTimeWindow(TimeWindow::Between(
            a.to_string(),
            b.to_string(),
        ))),
        ("notime", []) => KeyAction::Run(Command::SetTimeWindow(TimeWindow::Clear)),
        ("field", [spec]) => KeyAction::Run(Command::SetFieldFilter(spec.to_string())),
        ("nofield", [name]) => KeyAction::Run(Command::ClearFieldFilter(name.to_string())),
        ("clear", []) => KeyAction::Run(Command::Clear { force: false }),
        ("clear", ["force"]) => KeyAction::Run(Command::Clear { force: true }),
        ("pause", []) => KeyAction::Run(Command::Pause),
        ("follow", []) => KeyAction::Run(Command::Follow),
        ("slow", [warn, slow, critical]) => {
            match (warn.parse(), slow.parse(), critical.parse()) {
                (Ok(warn_ms), Ok(slow_ms), Ok(critical_ms)) => {
                    KeyAction::Run(Command::SetHighlighterConfig(SlowQueryConfig {
                        enabled: true,
                        warn_ms,
                        slow_ms,
                        critical_ms,
                    }))
                }
                _ => KeyAction::Message("slow: thresholds must be numbers (ms)".to_string()),
            }
        }
        ("highlight", [name, toggle]) => match *toggle {
            "on" => KeyAction::Run(Command::SetHighlighterEnabled(name.to_string(), true)),
            "off" => KeyAction::Run(Command::SetHighlighterEnabled(name.to_string(), false)),
            _ => KeyAction::Message("highlight: expected on or off".to_string()),
        },
        ("resethl", []) => KeyAction::Run(Command::ResetHighlighters),
        ("export", [path, args @ ..]) => parse_export(path, args),
        ("pipe", args) if !args.is_empty() => KeyAction::Run(Command::PipeBuffer {
            command: args.join(" "),
            format: ExportFormat::Text,
        }),
        ("errors", ["clear"]) => KeyAction::Run(Command::ClearErrorStats),
        ("connections", ["clear"]) => KeyAction::Run(Command::ClearConnectionStats),
        _ => KeyAction::Message(format!("Unknown command: {line}")),
    }
}

fn parse_export(path: &str, args: &[&str]) -> KeyAction {
    let mut format = ExportFormat::Text;
    let mut preserve_markup = false;

    for arg in args {
        if *arg == "markup" {
            preserve_markup = true;
        } else {
            match arg.parse::<ExportFormat>() {
                Ok(f) => format = f,
                Err(e) => return KeyAction::Message(e),
            }
        }
    }

    KeyAction::Run(Command::ExportBuffer {
        path: path.into(),
        format,
        preserve_markup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(line: &str) -> Command {
        match parse_command_line(line) {
            KeyAction::Run(command) => command,
            other => panic!(
                "expected a command for '{line}', got {:?}",
                match other {
                    KeyAction::Message(m) => format!("message: {m}"),
                    _ => "non-command action".to_string(),
                }
            ),
        }
    }

    #[test]
    fn test_parse_filter_tokens() {
        assert!(matches!(run("/deadlock/"), Command::SetRegex(t) if t == "/deadlock/"));
        assert!(matches!(run("-/noise/"), Command::SetRegex(t) if t == "-/noise/"));
    }

    #[test]
    fn test_parse_levels() {
        assert!(matches!(run("levels warning+"), Command::SetLevels(s) if s == "warning+"));
        assert!(
            matches!(run("levels error fatal"), Command::SetLevels(s) if s == "error,fatal")
        );
    }

    #[test]
    fn test_parse_time_commands() {
        assert!(matches!(
            run("since 5m"),
            Command::SetTimeWindow(TimeWindow::Since(t)) if t == "5m"
        ));
        assert!(matches!(
            run("between 10:00 11:00"),
            Command::SetTimeWindow(TimeWindow::Between(a, b)) if a == "10:00" && b == "11:00"
        ));
    }

    #[test]
    fn test_parse_clear() {
        assert!(matches!(run("clear"), Command::Clear { force: false }));
        assert!(matches!(run("clear force"), Command::Clear { force: true }));
    }

    #[test]
    fn test_parse_export() {
        assert!(matches!(
            run("export /tmp/out.jsonl json"),
            Command::ExportBuffer { format: ExportFormat::Json, preserve_markup: false, .. }
        ));
        assert!(matches!(
            run("export /tmp/out.log markup"),
            Command::ExportBuffer { format: ExportFormat::Text, preserve_markup: true, .. }
        ));
    }

    #[test]
    fn test_parse_pipe_joins_args() {
        assert!(matches!(
            run("pipe grep -i deadlock"),
            Command::PipeBuffer { command, .. } if command == "grep -i deadlock"
        ));
    }

    #[test]
    fn test_unknown_command_reports_message() {
        assert!(matches!(
            parse_command_line("frobnicate"),
            KeyAction::Message(_)
        ));
    }

    #[test]
    fn test_stats_clear_commands() {
        assert!(matches!(run("errors clear"), Command::ClearErrorStats));
        assert!(matches!(
            run("connections clear"),
            Command::ClearConnectionStats
        ));
    }
}
