#![forbid(unsafe_code)]

use super::*;

impl SqliteStore {
    pub fn project_create(
        &mut self,
        request: CreateProjectRequest,
    ) -> Result<ProjectRow, StoreError> {
        let slug = canonicalize_slug(&request.slug)?;
        let active_branch = match request.active_branch.as_deref() {
            Some(branch) => canonicalize_branch(branch)?,
            None => DEFAULT_BRANCH.to_string(),
        };
        if request.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("project name must not be empty"));
        }
        let deploy_config_text = request
            .deploy_config
            .as_ref()
            .map(serde_json::Value::to_string);

        let now_ms = now_ms();
        let tx = self.conn.transaction()?;
        let insert = tx.execute(
            "INSERT INTO projects(slug, name, origin, active_branch, deploy_config, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                slug,
                request.name,
                request.origin,
                active_branch,
                deploy_config_text,
                now_ms,
            ],
        );

        if let Err(err) = insert {
            if is_constraint_violation(&err) {
                return Err(StoreError::ProjectAlreadyExists);
            }
            return Err(StoreError::Sql(err));
        }

        tx.commit()?;
        Ok(ProjectRow {
            slug,
            name: request.name,
            origin: request.origin,
            active_branch,
            deploy_config: request.deploy_config,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
        })
    }

    pub fn project_get(&self, slug: &str) -> Result<Option<ProjectRow>, StoreError> {
        let slug = canonicalize_slug(slug)?;
        let row = self
            .conn
            .query_row(
                "SELECT slug, name, origin, active_branch, deploy_config, created_at_ms, updated_at_ms \
                 FROM projects WHERE slug=?1",
                params![slug],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some(raw) => Ok(Some(project_row_from_raw(raw)?)),
            None => Ok(None),
        }
    }

    pub fn project_list(&self) -> Result<Vec<ProjectRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT slug, name, origin, active_branch, deploy_config, created_at_ms, updated_at_ms \
             FROM projects ORDER BY slug ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(project_row_from_raw((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
            ))?);
        }
        Ok(out)
    }

    pub fn project_set_active_branch(
        &mut self,
        slug: &str,
        branch: &str,
    ) -> Result<(), StoreError> {
        let slug = canonicalize_slug(slug)?;
        let branch = canonicalize_branch(branch)?;
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE projects SET active_branch=?2, updated_at_ms=?3 WHERE slug=?1",
            params![slug, branch, now_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownProject);
        }
        tx.commit()?;
        Ok(())
    }

    pub fn project_set_deploy_config(
        &mut self,
        slug: &str,
        deploy_config: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let slug = canonicalize_slug(slug)?;
        let deploy_config_text = deploy_config.as_ref().map(serde_json::Value::to_string);
        let now_ms = now_ms();

        let tx = self.conn.transaction()?;
        let updated = tx.execute(
            "UPDATE projects SET deploy_config=?2, updated_at_ms=?3 WHERE slug=?1",
            params![slug, deploy_config_text, now_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownProject);
        }
        tx.commit()?;
        Ok(())
    }

    /// Explicit delete; files, versions, commits, checkouts and snapshots go
    /// with the project via foreign-key cascade.
    pub fn project_delete(&mut self, slug: &str) -> Result<bool, StoreError> {
        let slug = canonicalize_slug(slug)?;
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM projects WHERE slug=?1", params![slug])?;
        tx.commit()?;
        Ok(deleted > 0)
    }
}

type RawProjectRow = (String, String, String, String, Option<String>, i64, i64);

fn project_row_from_raw(raw: RawProjectRow) -> Result<ProjectRow, StoreError> {
    let (slug, name, origin, active_branch, deploy_config, created_at_ms, updated_at_ms) = raw;
    let deploy_config = deploy_config
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|_| StoreError::InvalidInput("invalid deploy config row"))?;
    Ok(ProjectRow {
        slug,
        name,
        origin,
        active_branch,
        deploy_config,
        created_at_ms,
        updated_at_ms,
    })
}
