use std::process::Command;
use thiserror::Error;

/// Error returned when the host OS has no known power commands
#[derive(Debug, Error, PartialEq)]
pub enum PlatformError {
    /// The host OS is not one of windows, macos or linux
    #[error("{os} does not support {action}")]
    Unsupported {
        os: &'static str,
        action: &'static str,
    },
}

/// Returns the command that powers off this machine
///
/// The command is built but not started. Returns an error on operating
/// systems without a known shutdown command.
pub fn shutdown_command() -> Result<Command, PlatformError> {
    match std::env::consts::OS {
        "windows" => {
            let mut command = Command::new("shutdown");
            command.arg("/s");
            Ok(command)
        }
        "macos" => {
            let mut command = Command::new("shutdown");
            command.args(["-h", "now"]);
            Ok(command)
        }
        "linux" => {
            let mut command = Command::new("systemctl");
            command.args(["poweroff", "--ignore-inhibitors"]);
            Ok(command)
        }
        os => Err(PlatformError::Unsupported {
            os,
            action: "shutdown",
        }),
    }
}

/// Returns the command that reboots this machine
///
/// The command is built but not started. Returns an error on operating
/// systems without a known reboot command.
pub fn reboot_command() -> Result<Command, PlatformError> {
    match std::env::consts::OS {
        "windows" => {
            let mut command = Command::new("shutdown");
            command.arg("/r");
            Ok(command)
        }
        "macos" => Ok(Command::new("reboot")),
        "linux" => {
            let mut command = Command::new("systemctl");
            command.args(["reboot", "--ignore-inhibitors"]);
            Ok(command)
        }
        os => Err(PlatformError::Unsupported {
            os,
            action: "reboot",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(target_os = "linux")]
    use std::ffi::OsStr;

    #[cfg(target_os = "linux")]
    fn command_line(command: &Command) -> Vec<&OsStr> {
        let mut line = vec![command.get_program()];
        line.extend(command.get_args());
        line
    }

    // The commands are only built here, never started.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_commands() {
        let shutdown = shutdown_command().expect("linux supports shutdown");
        assert_eq!(
            command_line(&shutdown),
            ["systemctl", "poweroff", "--ignore-inhibitors"]
        );

        let reboot = reboot_command().expect("linux supports reboot");
        assert_eq!(
            command_line(&reboot),
            ["systemctl", "reboot", "--ignore-inhibitors"]
        );
    }

    #[test]
    fn test_supported_platforms() {
        let supported = matches!(std::env::consts::OS, "windows" | "macos" | "linux");
        assert_eq!(shutdown_command().is_ok(), supported);
        assert_eq!(reboot_command().is_ok(), supported);
    }

    #[test]
    fn test_unsupported_error_message() {
        let error = PlatformError::Unsupported {
            os: "plan9",
            action: "shutdown",
        };
        assert_eq!(error.to_string(), "plan9 does not support shutdown");
    }
}
