use log::debug;

/// Load a `.env` file when present. Missing files are fine; real runs can
/// configure everything through the environment directly.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(_) => debug!("No .env file found, using process environment"),
    }
}
