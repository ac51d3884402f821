use std::collections::HashMap;

pub const SANDBOX_HOME: &str = "/work";
pub const SANDBOX_TMPDIR: &str = "/work/tmp";

/// Build the environment handed to the sandbox bootstrap.
///
/// User entries are copied over minus any `LD_*` key (case-insensitive);
/// `HOME` and `TMPDIR` are pinned last so callers cannot redirect them. The
/// bootstrap clears the inherited environment and reinstates only this map
/// plus a fixed `PATH`.
pub fn sanitize_env(user: Option<&HashMap<String, String>>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    if let Some(user) = user {
        for (key, value) in user {
            if key.len() >= 3 && key[..3].eq_ignore_ascii_case("LD_") {
                continue;
            }
            env.insert(key.clone(), value.clone());
        }
    }
    env.insert("HOME".to_string(), SANDBOX_HOME.to_string());
    env.insert("TMPDIR".to_string(), SANDBOX_TMPDIR.to_string());
    env
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::sanitize_env;

    #[test]
    fn empty_input_yields_home_and_tmpdir() {
        let env = sanitize_env(None);
        assert_eq!(env.get("HOME").map(String::as_str), Some("/work"));
        assert_eq!(env.get("TMPDIR").map(String::as_str), Some("/work/tmp"));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn drops_ld_keys_case_insensitively() {
        let mut user = HashMap::new();
        user.insert("LD_PRELOAD".to_string(), "evil.so".to_string());
        user.insert("ld_library_path".to_string(), "/tmp".to_string());
        user.insert("Ld_AUDIT".to_string(), "x".to_string());
        user.insert("FOO".to_string(), "bar".to_string());

        let env = sanitize_env(Some(&user));
        assert!(env.keys().all(|k| !k[..3.min(k.len())].eq_ignore_ascii_case("LD_")));
        assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn user_cannot_redirect_home_or_tmpdir() {
        let mut user = HashMap::new();
        user.insert("HOME".to_string(), "/root".to_string());
        user.insert("TMPDIR".to_string(), "/tmp".to_string());

        let env = sanitize_env(Some(&user));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/work"));
        assert_eq!(env.get("TMPDIR").map(String::as_str), Some("/work/tmp"));
    }

    #[test]
    fn short_keys_are_kept() {
        let mut user = HashMap::new();
        user.insert("LD".to_string(), "x".to_string());
        let env = sanitize_env(Some(&user));
        assert_eq!(env.get("LD").map(String::as_str), Some("x"));
    }
}
