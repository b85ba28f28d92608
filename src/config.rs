mod commandline;
mod defaults;
mod file;
mod primitives;

use commandline::Output;
use defaults::Defaults;

pub(crate) use file::{
    ConfigFile as Configuration, Media, ObjectStorage, Repo, Server, Sled, Store, Tracing,
};
pub(crate) use primitives::LogFormat;

/// Layer defaults, the optional config file, `VIDSTASH__`-prefixed
/// environment variables, and commandline flags, in increasing precedence.
pub(crate) fn configure() -> color_eyre::Result<Configuration> {
    let Output {
        config_file,
        overrides,
        save_to,
    } = commandline::parse();

    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&Defaults::default())?);

    if let Some(config_file) = config_file {
        builder = builder.add_source(config::File::from(config_file));
    }

    let mut config: Configuration = builder
        .add_source(config::Environment::with_prefix("VIDSTASH").separator("__"))
        .add_source(config::Config::try_from(&overrides)?)
        .build()?
        .try_deserialize()?;

    ensure_trailing_slash(&mut config.media.public_base_url);

    if let Some(save_to) = save_to {
        let output = toml::to_string_pretty(&config)?;
        std::fs::write(save_to, output)?;
    }

    Ok(config)
}

/// `Url::join` treats a base without a trailing slash as a file and drops its
/// last path segment, so published urls would lose part of the base.
fn ensure_trailing_slash(url: &mut url::Url) {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::{defaults::Defaults, ensure_trailing_slash, Configuration};

    #[test]
    fn defaults_deserialize_as_configuration() {
        let config: Configuration = config::Config::builder()
            .add_source(config::Config::try_from(&Defaults::default()).expect("valid defaults"))
            .build()
            .expect("builds")
            .try_deserialize()
            .expect("complete configuration");

        assert_eq!(config.media.max_upload_bytes, 1024 * 1024 * 1024);
        assert_eq!(config.media.accepted_media_types, vec!["video/mp4"]);
    }

    #[test]
    fn base_url_without_trailing_slash_keeps_its_last_segment() {
        let mut url: url::Url = "https://cdn.example.com/media".parse().expect("valid url");

        ensure_trailing_slash(&mut url);

        assert_eq!(url.as_str(), "https://cdn.example.com/media/");
        assert_eq!(
            url.join("landscape/abc.mp4").expect("joins").as_str(),
            "https://cdn.example.com/media/landscape/abc.mp4"
        );
    }

    #[test]
    fn base_url_with_trailing_slash_is_untouched() {
        let mut url: url::Url = "https://cdn.example.com/media/".parse().expect("valid url");

        ensure_trailing_slash(&mut url);

        assert_eq!(url.as_str(), "https://cdn.example.com/media/");
    }

    #[test]
    fn configuration_round_trips_through_toml() {
        let config: Configuration = config::Config::builder()
            .add_source(config::Config::try_from(&Defaults::default()).expect("valid defaults"))
            .build()
            .expect("builds")
            .try_deserialize()
            .expect("complete configuration");

        let serialized = toml::to_string_pretty(&config).expect("serializes");
        let parsed: Configuration = toml::from_str(&serialized).expect("parses back");

        assert_eq!(parsed.server.address, config.server.address);
        assert_eq!(parsed.media.public_base_url, config.media.public_base_url);
    }
}
