use crate::error::PatchError;

/// Applies edit instructions to a file's current content.
pub trait PatchStrategy: Send + Sync {
    fn apply(&self, original: &str, instructions: &str) -> Result<String, PatchError>;
}

/// Naive line-positional patching.
///
/// A cursor walks the original lines: ` x` (or an empty line) advances it,
/// `+x` inserts `x` at the cursor and advances, `-x` removes the line under
/// the cursor. Hunk headers, leading file headers and `\ No newline`
/// markers are skipped, so hunks are not anchored; every instruction is
/// applied relative to the running cursor.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinePositionalPatch;

impl PatchStrategy for LinePositionalPatch {
    fn apply(&self, original: &str, instructions: &str) -> Result<String, PatchError> {
        let mut lines: Vec<String> = original.lines().map(str::to_string).collect();
        let mut cursor = 0usize;
        let mut in_preamble = true;

        for (index, line) in instructions.lines().enumerate() {
            if in_preamble && is_file_header(line) {
                continue;
            }
            in_preamble = false;

            if line.starts_with("@@") || line.starts_with('\\') {
                continue;
            }

            if line.is_empty() {
                cursor += 1;
                continue;
            }

            let mut chars = line.chars();
            match chars.next() {
                Some(' ') => cursor += 1,
                Some('+') => {
                    let at = cursor.min(lines.len());
                    lines.insert(at, chars.as_str().to_string());
                    cursor = at + 1;
                }
                Some('-') => {
                    if cursor < lines.len() {
                        lines.remove(cursor);
                    }
                }
                _ => {
                    return Err(PatchError::UnrecognizedLine {
                        line_number: index + 1,
                        line: line.to_string(),
                    })
                }
            }
        }

        let mut patched = lines.join("\n");
        if original.ends_with('\n') && !lines.is_empty() {
            patched.push('\n');
        }
        Ok(patched)
    }
}

// `---`/`+++` only name files before the first hunk or instruction; later
// they delete a line starting `-- ` or insert one starting `++ `.
fn is_file_header(line: &str) -> bool {
    line.starts_with("--- ") || line.starts_with("+++ ")
}
