pub mod common;
pub mod custompodcount_e2e;

use common::Error;
use custompodcount_e2e::{custompodcount_e2e_test, custompodcount_scaling_e2e_test};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cmd = env::args().nth(1).unwrap_or_default();
    match cmd.as_str() {
        "custompodcount" => {
            println!("Running custompodcount end-to-end test");
            custompodcount_e2e_test().await
        }
        "custompodcount-scaling" => {
            println!("Running custompodcount end-to-end test for scaling");
            custompodcount_scaling_e2e_test().await
        }
        _ => {
            println!("Please specify one test: custompodcount or custompodcount-scaling");
            Ok(())
        }
    }
}
