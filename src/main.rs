fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    actix_web::rt::System::new().block_on(vidstash::run())
}
