use super::target::ReviewTarget;

pub const BASE_COMMAND: &str = "gerrit review";

/// Render the remote command for one target.
///
/// `args` goes out verbatim. Quoting anything the remote shell would split is
/// the caller's job.
pub fn format_command(target: &ReviewTarget, args: &str) -> String {
    format!(
        "{} {},{} {}",
        BASE_COMMAND, target.change, target.patch_set, args
    )
}
