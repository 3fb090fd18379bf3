fn main() {
    println!("Four in a Line - Multiplayer Network Game");
    println!();
    println!("Usage:");
    println!("  Start the server:   cargo run --bin server -- <port>");
    println!("  Connect a client:   cargo run --bin client [host:port]");
    println!();
    println!("Run two clients against the same server to start a match;");
    println!("further clients may join a started match as spectators.");
}
