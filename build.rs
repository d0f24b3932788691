fn main() {
    if let Err(err) = built::write_built_file() {
        panic!("failed to write build metadata: {err}");
    }
}
