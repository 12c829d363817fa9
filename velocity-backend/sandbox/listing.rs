//! Parser for `ls -Rp` output.
//!
//! The sandbox API has no structured listing call, so the recursive `ls`
//! text is parsed back into a flat list of paths relative to the queried root.

use super::types::ExecRequest;

const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git"];

/// Command producing the listing `parse_ls_recursive` understands.
/// `-p` marks directories with a trailing `/` so they can be skipped.
pub fn listing_request(directory: &str) -> ExecRequest {
    ExecRequest::new("ls", ["-Rp", directory]).with_cwd("/")
}

/// `total N` block-count line that `ls -l` prints right under a header.
fn is_total_line(line: &str) -> bool {
    line.strip_prefix("total ")
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

/// Entries in `ls -l` format (`drwxr-xr-x ...`, `-rw-r--r-- ...`).
fn is_long_format_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    if bytes.len() < 10 || !matches!(bytes[0], b'd' | b'-') {
        return false;
    }
    bytes[1..10].iter().all(|b| matches!(b, b'r' | b'w' | b'x' | b'-'))
}

fn is_excluded(rel_path: &str) -> bool {
    rel_path
        .split('/')
        .any(|seg| seg.starts_with('.') || EXCLUDED_DIRS.contains(&seg))
}

/// Turn the header of a `ls -R` section (`/root/src:`) into a path
/// relative to `root`. Headers outside `root` are kept verbatim.
fn relative_dir(header: &str, root: &str) -> String {
    let root = root.trim_end_matches('/');
    let dir = header.strip_prefix(root).unwrap_or(header);
    dir.trim_start_matches('/').trim_start_matches("./").to_string()
}

/// Parse `ls -Rp <root>` output into file paths relative to `root`.
///
/// A section header is the first line or a line following a blank one, so
/// entries that merely end in `:` stay entries. Skips directory entries,
/// the `total N` line under a header, long-format lines, and anything at
/// any depth under `node_modules`, `.git`, or a dotfile.
pub fn parse_ls_recursive(stdout: &str, root: &str) -> Vec<String> {
    let mut files = Vec::new();
    let mut current_dir = String::new();
    let mut at_section_start = true;
    let mut after_header = false;

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            at_section_start = true;
            after_header = false;
            continue;
        }

        if at_section_start {
            at_section_start = false;
            if let Some(header) = trimmed.strip_suffix(':') {
                current_dir = relative_dir(header, root);
                after_header = true;
                continue;
            }
        }

        let first_entry = std::mem::take(&mut after_header);
        if (first_entry && is_total_line(trimmed))
            || is_long_format_line(trimmed)
            || trimmed.ends_with('/')
        {
            continue;
        }

        let path = if current_dir.is_empty() || current_dir == "." {
            trimmed.to_string()
        } else {
            format!("{current_dir}/{trimmed}")
        };

        if !is_excluded(&path) {
            files.push(path);
        }
    }

    files
}
