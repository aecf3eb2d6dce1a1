//! Pattern-based command gate.
//!
//! This is a blocklist plus a read-only allowlist, not a sandbox. It keeps
//! the obviously destructive commands from ever being spawned and limits
//! which recovered commands may run without an explicit tool call.

use once_cell::sync::Lazy;
use regex::Regex;

/// Substrings that deny a command outright (matched case-insensitively).
pub const DENIED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "rm -rf /usr",
    "rm -rf /bin",
    "dd if=",
    "mkfs",
    "fdisk",
    "shred",
    "cryptsetup",
    "chmod 777",
];

static SUDO_RM_ROOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bsudo\b.*\brm\s+-rf\s+/").expect("valid sudo rm pattern"));

/// Informational commands that may run automatically, either exactly or
/// followed by a space and arguments.
pub const READ_ONLY_COMMANDS: &[&str] = &[
    "who", "w", "users", "whoami", "id",
    "cat /etc/passwd", "getent passwd", "cut -d: -f1 /etc/passwd",
    "ls", "pwd", "date", "uptime",
    "uname", "hostname", "df", "free",
    "ps", "systemctl list-units", "systemctl status",
    "netstat", "ss", "ip addr", "ip route",
];

/// Read-only verbs accepted with any arguments.
pub const READ_ONLY_PREFIXES: &[&str] = &[
    "cat ", "less ", "head ", "tail ", "grep ", "find ", "ls ", "getent ", "cut ",
];

/// Shell constructs that could chain, redirect or substitute a second command.
pub const SHELL_METACHARACTERS: &[&str] = &[";", "|", ">", "`", "$("];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandVerdict {
    /// Matches the denylist; must never be spawned.
    Denied,
    /// Read-only and free of shell metacharacters; may run without a tool call.
    AutoExecute,
    /// Anything else: show it to the user, do not run it.
    SuggestOnly,
}

pub fn is_dangerous(command: &str) -> bool {
    let lowered = command.to_lowercase();
    DENIED_PATTERNS.iter().any(|pattern| lowered.contains(pattern))
        || SUDO_RM_ROOT.is_match(&lowered)
}

pub fn is_read_only(command: &str) -> bool {
    let lowered = command.trim().to_lowercase();

    if SHELL_METACHARACTERS.iter().any(|meta| lowered.contains(meta)) {
        return false;
    }

    let allowlisted = READ_ONLY_COMMANDS.iter().any(|safe| {
        lowered == *safe
            || lowered
                .strip_prefix(safe)
                .map_or(false, |rest| rest.starts_with(' '))
    });

    allowlisted || READ_ONLY_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix))
}

pub fn classify(command: &str) -> CommandVerdict {
    verdict_for(command, is_read_only(command))
}

/// Verdict for a recovered command whose auto-execute eligibility was
/// already decided by the parser. The denylist always wins.
pub fn verdict_for(command: &str, auto_execute: bool) -> CommandVerdict {
    if is_dangerous(command) {
        CommandVerdict::Denied
    } else if auto_execute {
        CommandVerdict::AutoExecute
    } else {
        CommandVerdict::SuggestOnly
    }
}
