pub fn run(host: &str, port: u16) {
    let base = format!("{host}:{port}");

    println!("meterview dummy server v{}", meterview_core::VERSION);
    println!("   ws://{base}/");
    println!();
    println!("   Endpoints:");
    println!("     GET /                              WebSocket: initial snapshot, then 1 update/s");
    println!("     GET /download/samples_custom.json  Bucket-averaged range");
    println!("     GET /download/samples_custom.csv   Same range as CSV");
    println!("     GET /health                        Sample counts");
    println!();
    println!("   Try:");
    println!("     meterview monitor --endpoint ws://{base}/");
    println!("     meterview preview --base-url http://{base}/ --last 300 --bucket-size 10");
    println!();

    let rt = super::runtime();
    if let Err(e) = rt.block_on(meterview_server::run_server(host, port)) {
        eprintln!("Server error: {e}");
        std::process::exit(1);
    }
}
