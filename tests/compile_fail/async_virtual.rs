//! Overrides cannot be async.

struct Watcher;

#[nativebind::script_class(base = "Node")]
impl Watcher {
    #[native_virtual]
    async fn _ready(&self) {}
}

fn main() {
    let _ = Watcher;
}
