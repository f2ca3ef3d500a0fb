// Native messaging host entry point. Chrome launches this binary and speaks
// the length-prefixed JSON protocol over stdin/stdout; logging is file-only.
fn main() {
    vnc_bridge::run_host();
}
