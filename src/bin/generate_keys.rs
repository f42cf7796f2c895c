//! Prints a fresh Ed25519 signing key for `JWT_PRIVATE_KEY`.
//!
//! `generate_keys --env` prints only the `.env` line, for piping.

use feedloop::auth::jwt::JwtConfig;

fn main() {
    let env_only = std::env::args().skip(1).any(|arg| arg == "--env");
    let (private_key, public_key) = JwtConfig::generate_key_pair();

    if env_only {
        println!("JWT_PRIVATE_KEY={private_key}");
        return;
    }

    println!("# feedloop session signing key");
    println!("JWT_PRIVATE_KEY={private_key}");
    println!();
    println!("# Verification key, for services that only check feedloop tokens:");
    println!("# {public_key}");
}
