// Conformance test runner: `cts list [QUERY..]`, `cts run [QUERY..]`.

fn main() {
    gpu_cts::cli::run();
}
