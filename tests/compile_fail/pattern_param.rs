//! Virtual parameters must be plain names.

struct Watcher;

#[nativebind::script_class(base = "Node")]
impl Watcher {
    #[native_virtual]
    fn _input(&self, (a, b): (i64, i64)) {}
}

fn main() {
    let _ = Watcher;
}
