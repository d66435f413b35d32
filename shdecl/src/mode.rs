//! File mode calculation from the current umask

const DIR_BASE: u32 = 0o777;
const FILE_BASE: u32 = 0o666;

/// Parse an octal umask such as `022` or `0077`.
pub fn parse_umask(umask: &str) -> Option<u32> {
    let umask = umask.trim();
    if umask.is_empty() {
        return None;
    }
    u32::from_str_radix(umask, 8)
        .ok()
        .filter(|mask| *mask <= shdecl_config::MAX_UMASK)
}

/// Mode a newly created file or directory gets under `umask`, as four octal
/// digits. `None` when the umask does not parse.
pub fn mode_for(umask: &str, is_dir: bool) -> Option<String> {
    let mask = parse_umask(umask)?;
    let base = if is_dir { DIR_BASE } else { FILE_BASE };
    Some(format!("{:04o}", base & !mask))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_umask() {
        assert_eq!(mode_for("022", true).as_deref(), Some("0755"));
        assert_eq!(mode_for("022", false).as_deref(), Some("0644"));
    }

    #[test]
    fn test_restrictive_umask() {
        assert_eq!(mode_for("0077", true).as_deref(), Some("0700"));
        assert_eq!(mode_for("0077", false).as_deref(), Some("0600"));
    }

    #[test]
    fn test_unparsable_umask() {
        assert_eq!(mode_for("u=rwx", true), None);
        assert_eq!(mode_for("", false), None);
        assert_eq!(mode_for("0999", false), None);
    }

    #[test]
    fn test_pure() {
        assert_eq!(mode_for("027", true), mode_for("027", true));
    }
}
