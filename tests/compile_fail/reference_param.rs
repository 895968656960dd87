//! Virtual arguments are unboxed by value.

struct Watcher;

#[nativebind::script_class(base = "Node")]
impl Watcher {
    #[native_virtual]
    fn _input(&self, event: &str) {}
}

fn main() {
    let _ = Watcher;
}
