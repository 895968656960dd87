//! Unknown script_class keys are rejected.

struct Watcher;

#[nativebind::script_class(base = "Node", speed = 2)]
impl Watcher {}

fn main() {
    let _ = Watcher;
}
