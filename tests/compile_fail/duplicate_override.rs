//! Two methods cannot override the same virtual.

struct Watcher;
#[nativebind::script_class(base = "Node")]
impl Watcher {
    #[native_virtual]
    fn _ready(&mut self) {}
    #[native_virtual(name = "_ready")]
    fn also_ready(&mut self) {}
}

fn main() {
    let _ = Watcher;
}
