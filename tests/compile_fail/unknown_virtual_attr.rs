//! Unknown native_virtual keys are rejected.

struct Watcher;

#[nativebind::script_class(base = "Node")]
impl Watcher {
    #[native_virtual(alias = "_ready")]
    fn ready(&mut self) {}
}

fn main() {
    let _ = Watcher;
}
