use std::{error::Error, path::PathBuf, process::ExitCode, time::Duration};

use clap::{value_parser, Arg, ArgMatches, Command};
use objectio::{
    util::object::{parse_object_uri, ObjectLocation},
    ClientConfig, ObjectStorageClient,
};
use tracing::{error, info, span, Level};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .init();

    let span = span!(Level::INFO, "main", context = "main");
    let _e = span.enter();
    info!("called");

    match run(command().get_matches()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error_message = %err, error_group = "run");
            ExitCode::FAILURE
        }
    }
}

fn command() -> Command {
    let object = || {
        Arg::new("OBJECT")
            .required(true)
            .help("s3://bucket/key, or a key in the bucket named by S3_BUCKET")
    };

    Command::new("objectio")
        .version(clap::crate_version!())
        .subcommand_required(true)
        .subcommand(
            Command::new("upload")
                .about("Upload a local file")
                .arg(
                    Arg::new("SOURCE")
                        .required(true)
                        .index(1)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(object().index(2)),
        )
        .subcommand(
            Command::new("download")
                .about("Download an object to a local file")
                .arg(object().index(1))
                .arg(
                    Arg::new("DEST")
                        .required(true)
                        .index(2)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("url")
                .about("Print a signed, time-limited download URL")
                .arg(object().index(1))
                .arg(
                    Arg::new("expires")
                        .long("expires")
                        .value_name("SECS")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete an object")
                .arg(object().index(1)),
        )
}

async fn run(matches: ArgMatches) -> Result<(), Box<dyn Error>> {
    let config = ClientConfig::from_env()?;
    let default_bucket = config.default_bucket.clone();
    let client = ObjectStorageClient::new(config).await?;

    let (name, sub) = matches.subcommand().ok_or("missing subcommand")?;
    let location = {
        let uri = sub.get_one::<String>("OBJECT").ok_or("missing OBJECT")?;
        parse_object_uri(uri, default_bucket.as_deref())?
    };
    let ObjectLocation { bucket, key } = &location;
    info!(command = name, bucket = bucket, key = key, "args");

    match name {
        "upload" => {
            let source = sub.get_one::<PathBuf>("SOURCE").ok_or("missing SOURCE")?;
            let uploaded = client.upload_file(bucket, key, source).await?;
            println!("{}", uploaded.e_tag.unwrap_or_default());
        }
        "download" => {
            let dest = sub.get_one::<PathBuf>("DEST").ok_or("missing DEST")?;
            client.download_file(bucket, key, dest).await?;
        }
        "url" => {
            let expiry = sub.get_one::<u64>("expires").map(|secs| Duration::from_secs(*secs));
            let url = client.get_file_url(bucket, key, expiry).await?;
            println!("{}", url);
        }
        "delete" => client.delete_file(bucket, key).await?,
        other => return Err(format!("unknown subcommand: {}", other).into()),
    }

    Ok(())
}
