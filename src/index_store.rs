//! Relational storage for media files, faces and persons.
//!
//! Invariants enforced here and by the schema:
//! - exactly one `media_files` row per path; its id survives rescans,
//! - person names are unique,
//! - a face belongs to exactly one media file and disappears with it,
//! - reprocessing a media file replaces its faces inside one transaction, so a
//!   reader never sees old and new faces side by side.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;

use crate::embedding::vec_to_blob;
use crate::error::{IndexError, Result};
use crate::models::{
    BoundingRegion, DetectedFace, FaceAssignment, FaceRecord, MediaFile, NewMediaFile, Person,
    PersonMatch,
};

/// Outcome of [`IndexStore::replace_media`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The row and its faces were written.
    Written { media_file_id: i64 },
    /// Another writer already committed this exact content; nothing changed.
    AlreadyCurrent { media_file_id: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexCounts {
    pub media_files: i64,
    pub faces: i64,
    pub unresolved_faces: i64,
    pub persons: i64,
}

#[derive(Clone, Debug)]
pub struct IndexStore {
    pool: SqlitePool,
}

impl IndexStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Media files ============

    pub async fn find_media_by_path(&self, path: &str) -> Result<Option<MediaFile>> {
        let row = sqlx::query(
            "SELECT id, path, content_hash, last_modified, metadata_json FROM media_files WHERE path = ?",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| media_from_row(&row)))
    }

    /// Persist a (re)processed media file and its faces atomically.
    ///
    /// Inside a single transaction: upsert the media row unless the stored
    /// hash already equals `media.content_hash`, delete its previous faces,
    /// insert the new ones. When another writer already committed this exact
    /// content nothing is written and [`ReplaceOutcome::AlreadyCurrent`] is
    /// returned.
    pub async fn replace_media(
        &self,
        media: &NewMediaFile,
        faces: &[DetectedFace],
    ) -> Result<ReplaceOutcome> {
        let mut tx = self.pool.begin().await?;

        // The first statement writes, so concurrent scans queue on the write
        // lock instead of failing to upgrade a stale read snapshot.
        let Some(media_file_id) = upsert_changed_media(&mut tx, media).await? else {
            let media_file_id: i64 = sqlx::query_scalar("SELECT id FROM media_files WHERE path = ?")
                .bind(&media.path)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Ok(ReplaceOutcome::AlreadyCurrent { media_file_id });
        };

        sqlx::query("DELETE FROM faces WHERE media_file_id = ?")
            .bind(media_file_id)
            .execute(&mut *tx)
            .await?;

        for face in faces {
            insert_face(&mut tx, media_file_id, face).await?;
        }

        tx.commit().await?;
        Ok(ReplaceOutcome::Written { media_file_id })
    }

    /// All stored media paths that live under `root`.
    pub async fn media_paths_under(&self, root: &Path) -> Result<Vec<String>> {
        let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM media_files ORDER BY path")
            .fetch_all(&self.pool)
            .await?;
        Ok(paths
            .into_iter()
            .filter(|p| Path::new(p).starts_with(root))
            .collect())
    }

    /// Delete a media file; its faces go with it via `ON DELETE CASCADE`.
    pub async fn delete_media(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM media_files WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Persons ============

    pub async fn create_person(&self, name: &str) -> Result<Person> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IndexError::InvalidRequest(
                "person name must not be empty".to_string(),
            ));
        }

        let inserted = sqlx::query("INSERT INTO persons (name) VALUES (?)")
            .bind(name)
            .execute(&self.pool)
            .await;

        match inserted {
            Ok(result) => Ok(Person {
                id: result.last_insert_rowid(),
                name: name.to_string(),
            }),
            Err(e)
                if e
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false) =>
            {
                Err(IndexError::AlreadyExists(format!("person '{}'", name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_person_by_name(&self, name: &str) -> Result<Option<Person>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM persons WHERE name = ?")
                .bind(name.trim())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, name)| Person { id, name }))
    }

    pub async fn list_persons(&self) -> Result<Vec<Person>> {
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM persons ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| Person { id, name })
            .collect())
    }

    // ============ Faces ============

    /// Every face linked to `person_id`, with the owning media path.
    pub async fn find_faces_by_person(&self, person_id: i64) -> Result<Vec<PersonMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT m.path, f.box_x, f.box_y, f.box_width, f.box_height
            FROM faces f
            JOIN media_files m ON m.id = f.media_file_id
            WHERE f.person_id = ?
            "#,
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| PersonMatch {
                path: row.get("path"),
                region: region_from_row(row),
            })
            .collect())
    }

    pub async fn link_face(&self, face_id: i64, person_id: i64) -> Result<()> {
        let person_exists: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM persons WHERE id = ?")
                .bind(person_id)
                .fetch_one(&self.pool)
                .await?;
        if !person_exists {
            return Err(IndexError::not_found(format!("person {}", person_id)));
        }

        let result = sqlx::query("UPDATE faces SET person_id = ? WHERE id = ?")
            .bind(person_id)
            .bind(face_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(IndexError::not_found(format!("face {}", face_id)));
        }
        Ok(())
    }

    pub async fn unlink_face(&self, face_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE faces SET person_id = NULL WHERE id = ?")
            .bind(face_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(IndexError::not_found(format!("face {}", face_id)));
        }
        Ok(())
    }

    pub async fn list_faces(&self, unresolved_only: bool) -> Result<Vec<FaceRecord>> {
        let sql = if unresolved_only {
            format!("{} WHERE f.person_id IS NULL ORDER BY f.id", FACE_SELECT)
        } else {
            format!("{} ORDER BY f.id", FACE_SELECT)
        };
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(face_from_row).collect())
    }

    pub async fn faces_for_media(&self, media_file_id: i64) -> Result<Vec<FaceRecord>> {
        let sql = format!("{} WHERE f.media_file_id = ? ORDER BY f.id", FACE_SELECT);
        let rows = sqlx::query(&sql)
            .bind(media_file_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(face_from_row).collect())
    }

    pub async fn counts(&self) -> Result<IndexCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM media_files) AS media_files,
                (SELECT COUNT(*) FROM faces) AS faces,
                (SELECT COUNT(*) FROM faces WHERE person_id IS NULL) AS unresolved_faces,
                (SELECT COUNT(*) FROM persons) AS persons
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(IndexCounts {
            media_files: row.get("media_files"),
            faces: row.get("faces"),
            unresolved_faces: row.get("unresolved_faces"),
            persons: row.get("persons"),
        })
    }
}

const FACE_SELECT: &str = r#"
    SELECT f.id, f.media_file_id, m.path, f.person_id,
           f.box_x, f.box_y, f.box_width, f.box_height, f.confidence
    FROM faces f
    JOIN media_files m ON m.id = f.media_file_id
"#;

/// Insert a media file or, if its path exists with a different hash,
/// overwrite it in place. Returns the row id (stable for a given path), or
/// `None` when the stored row already carries `media.content_hash`.
pub async fn upsert_changed_media(
    conn: &mut SqliteConnection,
    media: &NewMediaFile,
) -> Result<Option<i64>> {
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO media_files (path, content_hash, last_modified, metadata_json)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            content_hash = excluded.content_hash,
            last_modified = excluded.last_modified,
            metadata_json = excluded.metadata_json
        WHERE media_files.content_hash <> excluded.content_hash
        RETURNING id
        "#,
    )
    .bind(&media.path)
    .bind(&media.content_hash)
    .bind(media.last_modified)
    .bind(media.metadata.to_string())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(id)
}

/// Insert one unresolved face for `media_file_id`.
pub async fn insert_face(
    conn: &mut SqliteConnection,
    media_file_id: i64,
    face: &DetectedFace,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO faces (media_file_id, person_id, box_x, box_y, box_width, box_height, embedding, confidence)
        VALUES (?, NULL, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(media_file_id)
    .bind(face.region.x as i64)
    .bind(face.region.y as i64)
    .bind(face.region.width as i64)
    .bind(face.region.height as i64)
    .bind(vec_to_blob(&face.embedding))
    .bind(face.confidence as f64)
    .execute(&mut *conn)
    .await?;
    Ok(result.last_insert_rowid())
}

fn media_from_row(row: &SqliteRow) -> MediaFile {
    let metadata_json: String = row.get("metadata_json");
    MediaFile {
        id: row.get("id"),
        path: row.get("path"),
        content_hash: row.get("content_hash"),
        last_modified: row.get("last_modified"),
        metadata: serde_json::from_str(&metadata_json).unwrap_or(serde_json::json!({})),
    }
}

fn region_from_row(row: &SqliteRow) -> BoundingRegion {
    BoundingRegion {
        x: row.get::<i64, _>("box_x") as u32,
        y: row.get::<i64, _>("box_y") as u32,
        width: row.get::<i64, _>("box_width") as u32,
        height: row.get::<i64, _>("box_height") as u32,
    }
}

fn face_from_row(row: &SqliteRow) -> FaceRecord {
    FaceRecord {
        id: row.get("id"),
        media_file_id: row.get("media_file_id"),
        path: row.get("path"),
        assignment: FaceAssignment::from_column(row.get("person_id")),
        region: region_from_row(row),
        confidence: row.get::<f64, _>("confidence") as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::apply_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> IndexStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        IndexStore::new(pool)
    }

    fn media(path: &str, hash: &str) -> NewMediaFile {
        NewMediaFile {
            path: path.to_string(),
            content_hash: hash.to_string(),
            last_modified: 1_700_000_000,
            metadata: serde_json::json!({"width": 10}),
        }
    }

    fn face(x: u32) -> DetectedFace {
        DetectedFace {
            region: BoundingRegion { x, y: 1, width: 8, height: 8 },
            embedding: vec![0.1, 0.2, 0.3],
            confidence: 0.9,
        }
    }

    #[tokio::test]
    async fn replacing_changed_media_keeps_id_and_drops_stale_faces() {
        let store = store().await;
        let first = store
            .replace_media(&media("/p/a.jpg", "h1"), &[face(1), face(2)])
            .await
            .unwrap();
        let ReplaceOutcome::Written { media_file_id } = first else {
            panic!("expected write");
        };

        let second = store
            .replace_media(&media("/p/a.jpg", "h2"), &[face(3)])
            .await
            .unwrap();
        assert_eq!(second, ReplaceOutcome::Written { media_file_id });

        let faces = store.faces_for_media(media_file_id).await.unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].region.x, 3);
        assert_eq!(faces[0].assignment, FaceAssignment::Unresolved);

        let stored = store.find_media_by_path("/p/a.jpg").await.unwrap().unwrap();
        assert_eq!(stored.content_hash, "h2");
        assert_eq!(stored.metadata["width"], 10);
    }

    #[tokio::test]
    async fn same_hash_is_not_rewritten() {
        let store = store().await;
        store.replace_media(&media("/p/a.jpg", "h1"), &[face(1)]).await.unwrap();
        let again = store
            .replace_media(&media("/p/a.jpg", "h1"), &[face(1), face(2)])
            .await
            .unwrap();
        assert!(matches!(again, ReplaceOutcome::AlreadyCurrent { .. }));
        assert_eq!(store.counts().await.unwrap().faces, 1);
    }

    #[tokio::test]
    async fn person_names_are_unique_and_trimmed() {
        let store = store().await;
        let alice = store.create_person("  Alice ").await.unwrap();
        assert_eq!(alice.name, "Alice");
        assert!(matches!(
            store.create_person("Alice").await,
            Err(IndexError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.create_person("   ").await,
            Err(IndexError::InvalidRequest(_))
        ));
        assert_eq!(store.find_person_by_name("Alice").await.unwrap(), Some(alice));
        assert_eq!(store.find_person_by_name("Bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn linking_and_unlinking_faces() {
        let store = store().await;
        store.replace_media(&media("/p/a.jpg", "h1"), &[face(5)]).await.unwrap();
        let alice = store.create_person("Alice").await.unwrap();
        let face_id = store.list_faces(true).await.unwrap()[0].id;

        store.link_face(face_id, alice.id).await.unwrap();
        assert!(store.list_faces(true).await.unwrap().is_empty());
        let hits = store.find_faces_by_person(alice.id).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/p/a.jpg");
        assert_eq!(hits[0].region.x, 5);

        store.unlink_face(face_id).await.unwrap();
        assert!(store.find_faces_by_person(alice.id).await.unwrap().is_empty());

        assert!(matches!(
            store.link_face(face_id, 999).await,
            Err(IndexError::NotFound(_))
        ));
        assert!(matches!(
            store.link_face(999, alice.id).await,
            Err(IndexError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleting_media_cascades_to_faces() {
        let store = store().await;
        store.replace_media(&media("/p/a.jpg", "h1"), &[face(1), face(2)]).await.unwrap();
        store.replace_media(&media("/q/b.jpg", "h2"), &[face(1)]).await.unwrap();

        assert_eq!(
            store.media_paths_under(Path::new("/p")).await.unwrap(),
            vec!["/p/a.jpg".to_string()]
        );
        assert!(store.delete_media("/p/a.jpg").await.unwrap());
        assert!(!store.delete_media("/p/a.jpg").await.unwrap());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.media_files, 1);
        assert_eq!(counts.faces, 1);
    }
}
