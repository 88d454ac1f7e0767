//! Substitutes `IN_i` / `OUT_NAME.EXT` tokens in user source with absolute host paths
//! that resolve identically inside the container, because the invoker bind-mounts the
//! storage roots at the same absolute paths (identity mount).

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::CoreError;

/// Compiled once at process init, never recompiled.
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            \bIN_(?P<in_idx>\d+)\b
            |
            OUT_\{?(?P<out_name>[A-Za-z0-9_-]+)\}?\.(?P<out_ext>[A-Za-z0-9]+)
            ",
        )
        .expect("placeholder pattern is valid")
    })
}

/// Rewrites every `IN_i` / `OUT_NAME.EXT` token in `source` into a quoted absolute path
/// under `storage_in`/`storage_out`, namespaced by `job_id`. Fails closed: any out-of-range
/// input index, or any placeholder-shaped substring surviving the rewrite, is `BadPlaceholder`.
pub fn rewrite(
    source: &str,
    job_id: Uuid,
    declared_inputs: &[String],
    storage_in: &Path,
    storage_out: &Path,
) -> Result<String, CoreError> {
    let re = placeholder_regex();
    let mut out = String::with_capacity(source.len());
    let mut last_end = 0;

    for caps in re.captures_iter(source) {
        let whole = caps.get(0).unwrap();
        out.push_str(&source[last_end..whole.start()]);

        if let Some(idx) = caps.name("in_idx") {
            let i: i64 = idx.as_str().parse().map_err(|_| {
                CoreError::BadPlaceholder(format!("invalid IN_ index: {}", idx.as_str()))
            })?;
            if i < 1 || i as usize > declared_inputs.len() {
                return Err(CoreError::BadPlaceholder(format!(
                    "IN_{} is out of range (have {} declared input(s))",
                    i,
                    declared_inputs.len()
                )));
            }
            let basename = Path::new(&declared_inputs[i as usize - 1])
                .file_name()
                .ok_or_else(|| {
                    CoreError::BadPlaceholder(format!(
                        "invalid declared input name: {}",
                        declared_inputs[i as usize - 1]
                    ))
                })?
                .to_string_lossy()
                .into_owned();
            let path = storage_in.join(job_id.to_string()).join(basename);
            out.push('"');
            out.push_str(&path.to_string_lossy());
            out.push('"');
        } else {
            let name = caps.name("out_name").unwrap().as_str();
            let ext = caps.name("out_ext").unwrap().as_str();
            let sanitized_name = sanitize(name).to_lowercase();
            let sanitized_ext = sanitize(ext).to_lowercase();
            let filename = format!("{sanitized_name}.{sanitized_ext}");
            let path = storage_out.join(job_id.to_string()).join(filename);
            out.push('"');
            out.push_str(&path.to_string_lossy());
            out.push('"');
        }

        last_end = whole.end();
    }
    out.push_str(&source[last_end..]);

    if re.is_match(&out) {
        return Err(CoreError::BadPlaceholder(
            "a placeholder-shaped token survived rewriting".to_string(),
        ));
    }

    Ok(out)
}

/// Strips characters outside `[A-Za-z0-9._-]`.
fn sanitize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '_' || *c == '-')
        .collect()
}
