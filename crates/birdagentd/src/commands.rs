//! Command builders for the two text producers

use birdagent_common::Invocation;

/// Default path of the bird control client
pub const DEFAULT_BIRDC: &str = "/usr/sbin/birdc";

/// Arguments that make birdc dump the state of every protocol
pub const BIRDC_ARGS: [&str; 3] = ["show", "protocols", "all"];

/// Default socket-table query: established sessions on the BGP port
pub const DEFAULT_SS_COMMAND: &str =
    "ss -ntH state established '( sport = :179 or dport = :179 )'";

/// Build protocol status dump invocation
///
/// Runs birdc directly, without a shell
pub fn build_bird_status_invocation(birdc: &str) -> Invocation {
    Invocation::argv(birdc, BIRDC_ARGS)
}

/// Build socket table query invocation
///
/// The command line is operator-supplied and runs through the shell
pub fn build_socket_table_invocation(command: &str) -> Invocation {
    Invocation::shell(command)
}
