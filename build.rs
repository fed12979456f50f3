fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use the vendored protoc unless the environment already provides one.
    if std::env::var_os("PROTOC").is_none() {
        std::env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    println!("cargo:rerun-if-changed=src/network/messages/chord.proto");
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(
            &["src/network/messages/chord.proto"],
            &["src/network/messages/"],
        )?;
    Ok(())
}
