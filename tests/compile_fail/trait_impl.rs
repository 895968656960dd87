//! A trait impl cannot carry overrides.

struct Watcher;

#[nativebind::script_class(base = "Node")]
impl Default for Watcher {
    fn default() -> Self { Watcher }
}

fn main() {
    let _ = Watcher;
}
