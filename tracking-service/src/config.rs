use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "tracking-service", about = "Parcel tracking dashboard service")]
pub struct Args {
    /// Full connection string; takes precedence over the individual --db-* flags.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    #[arg(long, env = "DB_PORT", default_value = "5432")]
    pub db_port: u16,

    #[arg(long, env = "DB_USER", default_value = "postgres")]
    pub db_user: String,

    #[arg(long, env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, env = "DB_NAME", default_value = "parcel_tracking")]
    pub db_name: String,

    #[arg(long, env = "DB_POOL_SIZE", default_value = "1")]
    pub pool_size: u32,

    #[arg(long, env = "PORT", default_value = "3001")]
    pub port: u16,

    #[arg(long)]
    pub skip_migrations: bool,
}

/// Where and how to reach the database. Fixed for the life of the process.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub pool_size: u32,
}

impl DatabaseSettings {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// A libpq key/value string, or the explicit URL when one was given.
    /// Both forms are understood by libpq (migrations) and tokio-postgres (pool).
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        let mut parts = vec![
            format!("host={}", quote(&self.host)),
            format!("port={}", self.port),
            format!("user={}", quote(&self.user)),
            format!("dbname={}", quote(&self.database)),
        ];
        if !self.password.is_empty() {
            parts.push(format!("password={}", quote(&self.password)));
        }
        parts.join(" ")
    }

    /// Connection target without credentials, for logs.
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(_) => "DATABASE_URL".to_string(),
            None => format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "parcel_tracking".to_string(),
            pool_size: 1,
        }
    }
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("target", &self.display_target())
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl From<&Args> for DatabaseSettings {
    fn from(args: &Args) -> Self {
        Self {
            url: args.database_url.clone().filter(|url| !url.is_empty()),
            host: args.db_host.clone(),
            port: args.db_port,
            user: args.db_user.clone(),
            password: args.db_password.clone(),
            database: args.db_name.clone(),
            pool_size: args.pool_size.max(1),
        }
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_setup() {
        let args = Args::try_parse_from(["tracking-service"]).unwrap();
        assert_eq!(args.db_host, "localhost");
        assert_eq!(args.db_name, "parcel_tracking");
        assert!(!args.skip_migrations);
    }

    #[test]
    fn builds_key_value_string() {
        let args = Args::try_parse_from([
            "tracking-service",
            "--db-host",
            "db.internal",
            "--db-port",
            "5432",
            "--db-user",
            "root",
            "--db-password",
            "it's a secret",
            "--db-name",
            "parcels",
        ])
        .unwrap();
        let settings = DatabaseSettings {
            url: None,
            ..DatabaseSettings::from(&args)
        };

        assert_eq!(
            settings.connection_string(),
            "host='db.internal' port=5432 user='root' dbname='parcels' password='it\\'s a secret'"
        );
    }

    #[test]
    fn empty_password_is_omitted() {
        let settings = DatabaseSettings::default();
        assert!(!settings.connection_string().contains("password"));
    }

    #[test]
    fn url_takes_precedence() {
        let settings = DatabaseSettings::from_url("postgres://u:p@h/db");
        assert_eq!(settings.connection_string(), "postgres://u:p@h/db");
        assert_eq!(settings.display_target(), "DATABASE_URL");
    }

    #[test]
    fn debug_hides_password() {
        let settings = DatabaseSettings {
            password: "hunter2".to_string(),
            ..DatabaseSettings::default()
        };
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }

    #[test]
    fn pool_size_is_at_least_one() {
        let args = Args::try_parse_from(["tracking-service", "--pool-size", "0"]).unwrap();
        assert_eq!(DatabaseSettings::from(&args).pool_size, 1);
    }
}
