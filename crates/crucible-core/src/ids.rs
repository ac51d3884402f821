use rand::RngExt as _;
use rand::distr::Alphanumeric;

const ID_SUFFIX_LEN: usize = 12;

/// Opaque run identifier: `run_` + 12 alphanumeric characters.
pub fn new_run_id() -> String {
    with_prefix("run_")
}

/// Stored-file identifier: `file_` + 12 alphanumeric characters. Shared by
/// uploads and artifacts.
pub fn new_file_id() -> String {
    with_prefix("file_")
}

// ThreadRng is a CSPRNG; collisions are not checked (negligible at 62^12).
fn with_prefix(prefix: &str) -> String {
    let mut id = String::with_capacity(prefix.len() + ID_SUFFIX_LEN);
    id.push_str(prefix);
    let mut rng = rand::rng();
    for _ in 0..ID_SUFFIX_LEN {
        id.push(char::from(rng.sample(Alphanumeric)));
    }
    id
}
