use crate::connection::{self, sql_err, SharedConnection};
use rusqlite::{params, OptionalExtension, Transaction};
use tributary_core::{
    error::Result, Department, DocumentStore, Institute, StoreConfig, University,
};

const HOLDERS_OF_INSTITUTE: &str = "SELECT u.document FROM universities u
     WHERE EXISTS (
         SELECT 1 FROM json_each(u.document, '$.institutes') i
         WHERE json_extract(i.value, '$.institute_id') = ?1
     )
     ORDER BY u.university_id";

const HOLDERS_OF_DEPARTMENT: &str = "SELECT u.document FROM universities u
     WHERE EXISTS (
         SELECT 1 FROM json_each(u.document, '$.institutes') i,
                       json_each(i.value, '$.departments') d
         WHERE json_extract(d.value, '$.department_id') = ?1
     )
     ORDER BY u.university_id";

/// SQLite-backed nested-document store
///
/// Each university is a row holding its whole document as JSON. Array
/// lookups go through SQLite's JSON functions; array edits are done on the
/// decoded document and written back inside the same transaction.
pub struct SqliteDocumentStore {
    conn: SharedConnection,
}

impl SqliteDocumentStore {
    pub fn open(cfg: &StoreConfig) -> Result<Self> {
        Self::with_connection(connection::open(cfg)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(connection::open_in_memory()?)
    }

    pub fn with_connection(conn: SharedConnection) -> Result<Self> {
        conn.lock()
            .execute(
                "CREATE TABLE IF NOT EXISTS universities (
                    university_id INTEGER PRIMARY KEY,
                    document TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                [],
            )
            .map_err(sql_err)?;
        Ok(Self { conn })
    }

    /// The underlying connection, for sharing with a dead-letter queue
    pub fn conn(&self) -> &SharedConnection {
        &self.conn
    }

    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_err)?;
        let out = f(&tx)?;
        tx.commit().map_err(sql_err)?;
        Ok(out)
    }
}

fn load(tx: &Transaction<'_>, university_id: i64) -> Result<Option<University>> {
    let doc: Option<String> = tx
        .query_row(
            "SELECT document FROM universities WHERE university_id = ?1",
            [university_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(sql_err)?;
    doc.map(|d| serde_json::from_str(&d).map_err(Into::into))
        .transpose()
}

fn save(tx: &Transaction<'_>, university: &University) -> Result<()> {
    let doc = serde_json::to_string(university)?;
    tx.execute(
        "INSERT INTO universities (university_id, document) VALUES (?1, ?2)
         ON CONFLICT(university_id) DO UPDATE
         SET document = excluded.document, updated_at = datetime('now')",
        params![university.university_id, doc],
    )
    .map_err(sql_err)?;
    Ok(())
}

fn query_docs(tx: &Transaction<'_>, sql: &str, id: i64) -> Result<Vec<University>> {
    let mut stmt = tx.prepare(sql).map_err(sql_err)?;
    let docs = stmt
        .query_map([id], |row| row.get::<_, String>(0))
        .map_err(sql_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(sql_err)?;
    docs.iter()
        .map(|d| serde_json::from_str(d).map_err(Into::into))
        .collect()
}

impl DocumentStore for SqliteDocumentStore {
    fn upsert_university(&self, university_id: i64, name: &str) -> Result<()> {
        self.write(|tx| {
            let mut university =
                load(tx, university_id)?.unwrap_or_else(|| University::new(university_id));
            university.name = Some(name.to_string());
            save(tx, &university)
        })
    }

    fn delete_university(&self, university_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "DELETE FROM universities WHERE university_id = ?1",
                [university_id],
            )
            .map_err(sql_err)?;
        Ok(n > 0)
    }

    fn university(&self, university_id: i64) -> Result<Option<University>> {
        self.write(|tx| load(tx, university_id))
    }

    fn universities(&self) -> Result<Vec<University>> {
        self.write(|tx| {
            let mut stmt = tx
                .prepare("SELECT document FROM universities ORDER BY university_id")
                .map_err(sql_err)?;
            let docs = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(sql_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(sql_err)?;
            docs.iter()
                .map(|d| serde_json::from_str(d).map_err(Into::into))
                .collect()
        })
    }

    fn find_institute(&self, institute_id: i64) -> Result<Option<(i64, Institute)>> {
        self.write(|tx| {
            let holders = query_docs(tx, HOLDERS_OF_INSTITUTE, institute_id)?;
            if holders.len() > 1 {
                tracing::warn!(
                    "Institute {} is held by {} universities",
                    institute_id,
                    holders.len()
                );
            }
            Ok(holders.into_iter().find_map(|u| {
                u.institute(institute_id)
                    .cloned()
                    .map(|i| (u.university_id, i))
            }))
        })
    }

    fn institute_exists(&self, institute_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS (
                 SELECT 1 FROM universities u, json_each(u.document, '$.institutes') i
                 WHERE json_extract(i.value, '$.institute_id') = ?1
             )",
            [institute_id],
            |row| row.get(0),
        )
        .map_err(sql_err)
    }

    fn pull_institute_except(&self, institute_id: i64, keep_university: i64) -> Result<usize> {
        self.write(|tx| {
            let mut changed = 0;
            for mut university in query_docs(tx, HOLDERS_OF_INSTITUTE, institute_id)? {
                if university.university_id == keep_university {
                    continue;
                }
                university
                    .institutes
                    .retain(|i| i.institute_id != institute_id);
                save(tx, &university)?;
                changed += 1;
            }
            Ok(changed)
        })
    }

    fn set_institute_name(
        &self,
        university_id: i64,
        institute_id: i64,
        name: &str,
    ) -> Result<bool> {
        self.write(|tx| {
            let Some(mut university) = load(tx, university_id)? else {
                return Ok(false);
            };
            let Some(institute) = university.institute_mut(institute_id) else {
                return Ok(false);
            };
            institute.name = name.to_string();
            save(tx, &university)?;
            Ok(true)
        })
    }

    fn push_institute(&self, university_id: i64, institute: &Institute) -> Result<()> {
        self.write(|tx| {
            let mut university =
                load(tx, university_id)?.unwrap_or_else(|| University::new(university_id));
            university.institutes.push(institute.clone());
            save(tx, &university)
        })
    }

    fn pull_institute(&self, university_id: i64, institute_id: i64) -> Result<bool> {
        self.write(|tx| {
            let Some(mut university) = load(tx, university_id)? else {
                return Ok(false);
            };
            let before = university.institutes.len();
            university
                .institutes
                .retain(|i| i.institute_id != institute_id);
            if university.institutes.len() == before {
                return Ok(false);
            }
            save(tx, &university)?;
            Ok(true)
        })
    }

    fn pull_department_except(&self, department_id: i64, keep_institute: i64) -> Result<usize> {
        self.write(|tx| {
            let mut changed = 0;
            for mut university in query_docs(tx, HOLDERS_OF_DEPARTMENT, department_id)? {
                let mut touched = false;
                for institute in university
                    .institutes
                    .iter_mut()
                    .filter(|i| i.institute_id != keep_institute)
                {
                    let before = institute.departments.len();
                    institute
                        .departments
                        .retain(|d| d.department_id != department_id);
                    if institute.departments.len() != before {
                        changed += 1;
                        touched = true;
                    }
                }
                if touched {
                    save(tx, &university)?;
                }
            }
            Ok(changed)
        })
    }

    fn update_department(&self, institute_id: i64, department: &Department) -> Result<bool> {
        self.write(|tx| {
            let mut matched = false;
            for mut university in query_docs(tx, HOLDERS_OF_INSTITUTE, institute_id)? {
                let Some(institute) = university.institute_mut(institute_id) else {
                    continue;
                };
                let Some(existing) = institute
                    .departments
                    .iter_mut()
                    .find(|d| d.department_id == department.department_id)
                else {
                    continue;
                };
                *existing = department.clone();
                save(tx, &university)?;
                matched = true;
            }
            Ok(matched)
        })
    }

    fn push_department(&self, institute_id: i64, department: &Department) -> Result<bool> {
        self.write(|tx| {
            let holders = query_docs(tx, HOLDERS_OF_INSTITUTE, institute_id)?;
            let Some(mut university) = holders.into_iter().next() else {
                return Ok(false);
            };
            let Some(institute) = university.institute_mut(institute_id) else {
                return Ok(false);
            };
            institute.departments.push(department.clone());
            save(tx, &university)?;
            Ok(true)
        })
    }

    fn pull_department(&self, institute_id: i64, department_id: i64) -> Result<bool> {
        self.write(|tx| {
            let mut removed = false;
            for mut university in query_docs(tx, HOLDERS_OF_INSTITUTE, institute_id)? {
                let Some(institute) = university.institute_mut(institute_id) else {
                    continue;
                };
                let before = institute.departments.len();
                institute
                    .departments
                    .retain(|d| d.department_id != department_id);
                if institute.departments.len() != before {
                    save(tx, &university)?;
                    removed = true;
                }
            }
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dept(id: i64, name: &str) -> Department {
        Department {
            department_id: id,
            name: name.to_string(),
            head: None,
            phone: None,
        }
    }

    #[test]
    fn upsert_university_initializes_institutes() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.upsert_university(1, "MSU").unwrap();
        store.upsert_university(1, "Moscow State").unwrap();

        let u = store.university(1).unwrap().unwrap();
        assert_eq!(u.name.as_deref(), Some("Moscow State"));
        assert!(u.institutes.is_empty());
        assert!(store.delete_university(1).unwrap());
        assert!(!store.delete_university(1).unwrap());
    }

    #[test]
    fn push_institute_creates_bare_university() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.push_institute(4, &Institute::new(5, "Eng")).unwrap();

        let u = store.university(4).unwrap().unwrap();
        assert_eq!(u.name, None);
        assert_eq!(u.institutes, vec![Institute::new(5, "Eng")]);
        assert!(store.institute_exists(5).unwrap());
        assert_eq!(store.find_institute(5).unwrap().unwrap().0, 4);
    }

    #[test]
    fn institute_lookup_and_pull() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.upsert_university(1, "A").unwrap();
        store.upsert_university(2, "B").unwrap();
        store.push_institute(1, &Institute::new(5, "Eng")).unwrap();

        assert!(!store.set_institute_name(2, 5, "X").unwrap());
        assert!(store.set_institute_name(1, 5, "Engineering").unwrap());
        assert_eq!(store.pull_institute_except(5, 1).unwrap(), 0);
        assert_eq!(store.pull_institute_except(5, 2).unwrap(), 1);
        assert!(!store.institute_exists(5).unwrap());
        assert!(!store.pull_institute(1, 5).unwrap());
    }

    #[test]
    fn department_primitives() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.push_institute(1, &Institute::new(2, "Sci")).unwrap();
        store.push_institute(1, &Institute::new(3, "Art")).unwrap();

        assert!(!store.push_department(9, &dept(7, "CS")).unwrap());
        assert!(!store.update_department(2, &dept(7, "CS")).unwrap());
        assert!(store.push_department(2, &dept(7, "CS")).unwrap());
        assert!(store.update_department(2, &dept(7, "Computer Science")).unwrap());

        assert_eq!(store.pull_department_except(7, 2).unwrap(), 0);
        assert_eq!(store.pull_department_except(7, 3).unwrap(), 1);

        let u = store.university(1).unwrap().unwrap();
        assert!(u.institute(2).unwrap().departments.is_empty());
        assert!(!store.pull_department(2, 7).unwrap());
    }

    #[test]
    fn documents_survive_reopen() {
        let temp = tempfile::TempDir::new().unwrap();
        let cfg = StoreConfig::new(temp.path().join("hierarchy.db"));
        {
            let store = SqliteDocumentStore::open(&cfg).unwrap();
            store.upsert_university(1, "A").unwrap();
            store.push_institute(1, &Institute::new(2, "Sci")).unwrap();
        }
        let store = SqliteDocumentStore::open(&cfg).unwrap();
        assert_eq!(store.universities().unwrap().len(), 1);
        assert!(store.institute_exists(2).unwrap());
    }
}
