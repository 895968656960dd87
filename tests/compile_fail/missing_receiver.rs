//! Overrides need a receiver.

struct Watcher;

#[nativebind::script_class(base = "Node")]
impl Watcher {
    #[native_virtual]
    fn _ready() {}
}

fn main() {
    let _ = Watcher;
}
