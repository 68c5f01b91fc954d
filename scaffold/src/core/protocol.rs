//! Fixed protocol strings surfaced to the model.
//!
//! Models are prompted against these exact bytes. Changing any of them is a
//! protocol change, not a wording tweak.

/// Appended when an assistant turn contains no command invocation.
pub const NO_COMMANDS_CALLED: &str = "ERROR: No valid command was called.";

/// Appended when an assistant turn contains more than one command invocation.
pub const TOO_MANY_COMMANDS: &str =
    "ERROR: You called too many commands. Only one command can be called at a time.";

/// Returned when a shell command exceeds its wall-clock timeout.
pub const SHELL_TIMED_OUT: &str = "BASH ERROR:\nCommand timed out.";

/// Returned when the blocklist refuses a shell command.
pub const SHELL_BLOCKED: &str = "BASH ERROR:\nInteractive command not allowed.";

/// Returned when a shell command exits with empty stdout and stderr.
pub const SHELL_NO_OUTPUT: &str = "BASH OUTPUT:\nCommand ran successfully with no output.";

/// Label prefixed to captured shell stdout.
pub const SHELL_STDOUT_LABEL: &str = "BASH OUTPUT:\n";

/// Label prefixed to captured shell stderr.
pub const SHELL_STDERR_LABEL: &str = "BASH ERROR:\n";

/// Returned after the submission artifact has been written.
pub const SUBMISSION_ACCEPTED: &str = "Successfully submitted answer.";

/// Returned when the browse command is invoked with content.
pub const BROWSE_TAKES_NO_ARGUMENTS: &str =
    "ERROR: The browse command does not take any arguments.";
