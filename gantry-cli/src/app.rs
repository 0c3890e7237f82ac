//! Demo application served by `gantry serve`

use gantry_core::{Context, Error, Result, StatusCode, Validate, Validator};
use gantry_router::{GroupRoute, Registration, Route};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize)]
struct Note {
    id: usize,
    author: String,
    title: String,
    body: String,
}

#[derive(Debug, Deserialize)]
struct NewNote {
    title: String,
    #[serde(default)]
    body: String,
}

impl Validate for NewNote {
    fn validate(&self) -> Result<()> {
        Validator::new()
            .field("title", &self.title, "required,min=1,max=120")
            .field("body", &self.body, "max=4096")
            .finish()
    }
}

type Notes = Arc<RwLock<Vec<Note>>>;

/// Routes of the demo application
pub fn routes() -> Result<Vec<Registration>> {
    let notes: Notes = Arc::default();

    let public = vec![
        Route::get("/health", |mut ctx: Context| async move {
            ctx.json(&serde_json::json!({ "status": "ok" }))
        })
        .name("health")
        .build()?,
        Route::get("/hello/:name", |mut ctx: Context| async move {
            let name = ctx.param("name").unwrap_or("world").to_string();
            ctx.text(format!("Hello, {name}!"))
        })
        .name("hello")
        .build()?,
        Route::post("/echo", |mut ctx: Context| async move {
            let value: serde_json::Value = ctx.body_json()?;
            ctx.json(&value)
        })
        .name("echo")
        .build()?,
    ];

    let list = {
        let notes = Arc::clone(&notes);
        move |mut ctx: Context| {
            let notes = Arc::clone(&notes);
            async move {
                let notes = notes.read().await;
                ctx.json(&*notes)
            }
        }
    };

    let create = {
        let notes = Arc::clone(&notes);
        move |mut ctx: Context| {
            let notes = Arc::clone(&notes);
            async move {
                let input: NewNote = ctx.bind()?;
                let author = ctx
                    .principal()
                    .map(|p| p.subject.clone())
                    .ok_or_else(|| Error::Authentication("no principal".to_string()))?;

                let mut notes = notes.write().await;
                let note = Note {
                    id: notes.len() + 1,
                    author,
                    title: input.title,
                    body: input.body,
                };
                notes.push(note.clone());
                ctx.status(StatusCode::CREATED).json(&note)
            }
        }
    };

    let api = GroupRoute::new("/api")
        .protected()
        .route(
            Route::get("/me", |mut ctx: Context| async move {
                let principal = ctx.principal().cloned();
                ctx.json(&principal)
            })
            .name("me")
            .build()?,
        )
        .group(
            GroupRoute::new("/notes")
                .route(
                    Route::get("/", list)
                        .name("notes.list")
                        .permission("notes:read")
                        .build()?,
                )
                .route(
                    Route::post("/", create)
                        .name("notes.create")
                        .permission("notes:write")
                        .build()?,
                ),
        );

    Ok(vec![public.into(), api.into()])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_routes_flatten() {
        let routes: Vec<Route> = routes()
            .unwrap()
            .into_iter()
            .flat_map(|r| r.into_routes().unwrap())
            .collect();

        assert_eq!(routes.len(), 6);
        let create = routes
            .iter()
            .find(|r| r.name.as_deref() == Some("notes.create"))
            .unwrap();
        assert_eq!(create.path, "/api/notes");
        assert!(create.protected);
        assert_eq!(create.permissions[0].to_string(), "notes:write");
    }

    #[test]
    fn test_new_note_validation() {
        let note = NewNote {
            title: String::new(),
            body: String::new(),
        };
        assert!(note.validate().is_err());
    }
}
