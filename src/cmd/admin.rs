//! Administrative commands that write directly to the database.

use anyhow::{Context, Result};

use patchwork::config::PatchworkConfig;
use patchwork::db::PatchworkDb;
use patchwork::errors::PatchworkError;
use patchwork::models::{LookupKey, NewProject, NewUser};

use crate::{MaintainerCommands, PersonCommands, ProjectCommands, StateCommands, UserCommands};

fn open_db(config: &PatchworkConfig) -> Result<PatchworkDb> {
    let path = &config.database.path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    PatchworkDb::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// New random API token.
fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn cmd_init(config: &PatchworkConfig, seed_states: bool) -> Result<()> {
    let db = open_db(config)?;
    if seed_states {
        let added = db.seed_default_states()?;
        tracing::info!(added, "seeded default states");
    }
    println!(
        "Database initialized at {}",
        config.database.path.display()
    );
    Ok(())
}

pub fn cmd_project(config: &PatchworkConfig, command: ProjectCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        ProjectCommands::Add {
            linkname,
            name,
            listid,
            listemail,
            web_url,
            scm_url,
            webscm_url,
        } => {
            let project = db.create_project(&NewProject {
                linkname,
                name,
                listid,
                listemail,
                web_url,
                scm_url,
                webscm_url,
            })?;
            println!("Created project '{}' (id {})", project.linkname, project.id);
        }
    }
    Ok(())
}

pub fn cmd_state(config: &PatchworkConfig, command: StateCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        StateCommands::Add {
            name,
            ordering,
            action_required,
        } => {
            let state = db.create_state(&name, ordering, action_required)?;
            println!("Created state '{}' (slug {})", state.name, state.slug);
        }
        StateCommands::List => {
            for state in db.list_states()? {
                let marker = if state.action_required { "*" } else { " " };
                println!(
                    "{:>3} {} {:<20} {}",
                    state.ordering, marker, state.slug, state.name
                );
            }
        }
    }
    Ok(())
}

pub fn cmd_user(config: &PatchworkConfig, command: UserCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        UserCommands::Add {
            username,
            email,
            superuser,
            first_name,
            last_name,
        } => {
            let user = db.create_user(&NewUser {
                username,
                email,
                first_name,
                last_name,
                is_superuser: superuser,
            })?;
            let token = generate_token();
            db.set_user_token(user.id, &token)?;
            tracing::info!(user = %user, superuser = user.is_superuser, "created user");
            println!("{}", token);
        }
        UserCommands::Token { user } => {
            let user = db
                .find_user(&LookupKey::parse(&user))?
                .ok_or(PatchworkError::UserNotFound { user })?;
            let token = generate_token();
            db.set_user_token(user.id, &token)?;
            tracing::info!(user = %user, "rotated API token");
            println!("{}", token);
        }
    }
    Ok(())
}

pub fn cmd_maintainer(config: &PatchworkConfig, command: MaintainerCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        MaintainerCommands::Add { user, project } => {
            let user = db
                .find_user(&LookupKey::parse(&user))?
                .ok_or(PatchworkError::UserNotFound { user })?;
            let project = db
                .find_project(&LookupKey::parse(&project))?
                .ok_or(PatchworkError::ProjectNotFound { project })?;
            db.add_maintainer(user.id, project.id)?;
            println!(
                "{} now maintains '{}'",
                user.username, project.linkname
            );
        }
    }
    Ok(())
}

pub fn cmd_person(config: &PatchworkConfig, command: PersonCommands) -> Result<()> {
    let db = open_db(config)?;
    match command {
        PersonCommands::Add { email, name } => {
            let person = db.create_person(&email, name.as_deref())?;
            println!("Created person <{}> (id {})", person.email, person.id);
        }
    }
    Ok(())
}
