fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/cottontail.proto");

    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        // Lets the shell render literals it cannot decode.
        .type_attribute(".", "#[derive(serde::Serialize)]")
        .compile(&["proto/cottontail.proto"], &["proto"])?;

    Ok(())
}
