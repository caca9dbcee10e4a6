//! Reverse proxy stack: compose definition and supervising unit
//!
//! The compose definition is serialized with serde_yaml. Compose
//! interpolates `$` in every scalar, so each string value is escaped
//! before it goes into the document.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{Configuration, HostLayout, StackSettings};
use crate::error::Result;

use super::{Artifact, DesiredResource, MANAGED_BANNER, ResourceKind};

/// systemd unit supervising the stack
pub const STACK_UNIT_NAME: &str = "bastion-stack.service";

/// Compose definition inside the stack directory
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Name of the stack network inside the compose file
const NETWORK_KEY: &str = "bastion";

#[derive(Debug, Serialize)]
struct ComposeFile {
    services: Services,
    volumes: BTreeMap<String, Option<()>>,
    networks: BTreeMap<String, ExternalNetwork>,
}

#[derive(Debug, Serialize)]
struct Services {
    app: Service,
    db: Service,
}

#[derive(Debug, Default, Serialize)]
struct Service {
    image: String,
    restart: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    environment: BTreeMap<String, String>,
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,
    networks: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ExternalNetwork {
    name: String,
    external: bool,
}

/// Escape a scalar so compose does not interpolate it
fn literal(value: &str) -> String {
    value.replace('$', "$$")
}

fn literals(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| literal(value)).collect()
}

fn literal_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), literal(value)))
        .collect()
}

fn compose_file(stack: &StackSettings) -> ComposeFile {
    let db_password = stack.db_password.expose();

    let app = Service {
        image: literal(&stack.proxy_image),
        restart: literal("unless-stopped"),
        ports: literals(&["80:80", "81:81", "443:443"]),
        environment: literal_map(&[
            ("DB_MYSQL_HOST", "db"),
            ("DB_MYSQL_PORT", "3306"),
            ("DB_MYSQL_USER", "npm"),
            ("DB_MYSQL_PASSWORD", db_password),
            ("DB_MYSQL_NAME", "npm"),
        ]),
        volumes: literals(&["npm_data:/data", "npm_letsencrypt:/etc/letsencrypt"]),
        labels: literal_map(&[("bastion.domain", stack.domain.as_str())]),
        depends_on: literals(&["db"]),
        networks: literals(&[NETWORK_KEY]),
    };

    let db = Service {
        image: literal(&stack.db_image),
        restart: literal("unless-stopped"),
        environment: literal_map(&[
            ("MYSQL_ROOT_PASSWORD", db_password),
            ("MYSQL_DATABASE", "npm"),
            ("MYSQL_USER", "npm"),
            ("MYSQL_PASSWORD", db_password),
        ]),
        volumes: literals(&["npm_mysql:/var/lib/mysql"]),
        networks: literals(&[NETWORK_KEY]),
        ..Service::default()
    };

    ComposeFile {
        services: Services { app, db },
        volumes: ["npm_data", "npm_letsencrypt", "npm_mysql"]
            .into_iter()
            .map(|volume| (volume.to_string(), None))
            .collect(),
        networks: BTreeMap::from([(
            NETWORK_KEY.to_string(),
            ExternalNetwork {
                name: literal(&stack.network),
                external: true,
            },
        )]),
    }
}

/// Render the compose definition
pub fn render_compose(stack: &StackSettings) -> Result<String> {
    let body = serde_yaml::to_string(&compose_file(stack))?;
    Ok(format!("{}\n{}", MANAGED_BANNER, body))
}

/// Render the supervising unit
pub fn render_unit(config: &Configuration, layout: &HostLayout) -> String {
    let compose = layout.stack_dir.join(COMPOSE_FILE);

    format!(
        "{banner}\n\
         [Unit]\n\
         Description=Bastion reverse proxy stack\n\
         Requires=docker.service\n\
         After=docker.service network-online.target {wg_service}\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         WorkingDirectory={dir}\n\
         ExecStart=/usr/bin/docker compose -f {compose} up --remove-orphans\n\
         ExecStop=/usr/bin/docker compose -f {compose} down\n\
         Restart=always\n\
         RestartSec=10\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        banner = MANAGED_BANNER,
        wg_service = super::wireguard::service_name(&config.wireguard.interface),
        dir = layout.stack_dir.display(),
        compose = compose.display(),
    )
}

pub(crate) fn stack_definition_resource(
    stack: &StackSettings,
    layout: &HostLayout,
) -> Result<DesiredResource> {
    Ok(DesiredResource::new(
        ResourceKind::StackDefinition,
        Artifact::File {
            path: layout.stack_dir.join(COMPOSE_FILE),
            mode: 0o600,
        },
        render_compose(stack)?,
    ))
}

pub(crate) fn stack_unit_resource(config: &Configuration, layout: &HostLayout) -> DesiredResource {
    DesiredResource::new(
        ResourceKind::StackUnit,
        Artifact::File {
            path: layout.systemd_dir.join(STACK_UNIT_NAME),
            mode: 0o644,
        },
        render_unit(config, layout),
    )
}
