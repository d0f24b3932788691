use clap::{Arg, Command};

pub const ARG_BASE_URL: &str = "base-url";
pub const ARG_GITHUB_CLIENT_ID: &str = "github-client-id";
pub const ARG_GITHUB_CLIENT_SECRET: &str = "github-client-secret";
pub const ARG_CALLBACK_URL: &str = "callback-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";

pub const MAX_SESSION_TTL_SECONDS: i64 = 31_536_000;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BASE_URL)
                .long("base-url")
                .help("Public base URL of this service (CORS origin, cookie Secure flag)")
                .env("NOTES_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_GITHUB_CLIENT_ID)
                .long("github-client-id")
                .help("GitHub OAuth app client id")
                .env("NOTES_GITHUB_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_GITHUB_CLIENT_SECRET)
                .long("github-client-secret")
                .help("GitHub OAuth app client secret")
                .env("NOTES_GITHUB_CLIENT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_CALLBACK_URL)
                .long("callback-url")
                .help("OAuth callback URL (default: <base-url>/auth/github/callback)")
                .env("NOTES_CALLBACK_URL"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long("session-ttl-seconds")
                .help("Session cookie TTL in seconds (at most one year)")
                .env("NOTES_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_SESSION_TTL_SECONDS)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> Command {
        with_args(Command::new("notes"))
    }

    #[test]
    fn defaults_apply_when_only_credentials_given() {
        temp_env::with_vars(
            [
                ("NOTES_BASE_URL", None::<&str>),
                ("NOTES_CALLBACK_URL", None),
                ("NOTES_SESSION_TTL_SECONDS", None),
                ("NOTES_GITHUB_CLIENT_ID", Some("id")),
                ("NOTES_GITHUB_CLIENT_SECRET", Some("secret")),
            ],
            || {
                let matches = command().get_matches_from(vec!["notes"]);
                assert_eq!(
                    matches.get_one::<String>(ARG_BASE_URL).map(String::as_str),
                    Some("http://localhost:8080")
                );
                assert_eq!(matches.get_one::<String>(ARG_CALLBACK_URL), None);
                assert_eq!(
                    matches.get_one::<i64>(ARG_SESSION_TTL_SECONDS).copied(),
                    Some(604_800)
                );
            },
        );
    }

    #[test]
    fn client_id_is_required() {
        temp_env::with_vars(
            [
                ("NOTES_GITHUB_CLIENT_ID", None::<&str>),
                ("NOTES_GITHUB_CLIENT_SECRET", Some("secret")),
            ],
            || {
                assert!(command().try_get_matches_from(vec!["notes"]).is_err());
            },
        );
    }

    #[test]
    fn session_ttl_is_bounded() {
        temp_env::with_vars(
            [
                ("NOTES_SESSION_TTL_SECONDS", None::<&str>),
                ("NOTES_GITHUB_CLIENT_ID", Some("id")),
                ("NOTES_GITHUB_CLIENT_SECRET", Some("secret")),
            ],
            || {
                let max = MAX_SESSION_TTL_SECONDS.to_string();
                let matches = command()
                    .try_get_matches_from(vec!["notes", "--session-ttl-seconds", max.as_str()]);
                assert!(matches.is_ok());

                let over = (MAX_SESSION_TTL_SECONDS + 1).to_string();
                for ttl in ["0", over.as_str(), "9223372036854775807"] {
                    assert!(
                        command()
                            .try_get_matches_from(vec!["notes", "--session-ttl-seconds", ttl])
                            .is_err(),
                        "ttl {ttl} should be rejected"
                    );
                }
            },
        );
    }
}
