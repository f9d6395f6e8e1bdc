//! Hidden password entry on the terminal.

use std::io::{self, Write};

use color_eyre::eyre::{Result, eyre};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Ask for the password of `user` without echoing it.
pub(crate) fn password(user: &str) -> Result<String> {
    eprint!("Password for user {user}: ");
    io::stderr().flush()?;

    enable_raw_mode()?;
    let entered = read_hidden();
    disable_raw_mode()?;
    eprintln!();

    entered
}

fn read_hidden() -> Result<String> {
    let mut password = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(password),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Err(eyre!("password entry cancelled"));
            }
            KeyCode::Backspace => {
                password.pop();
            }
            KeyCode::Char(c) => password.push(c),
            _ => {}
        }
    }
}
