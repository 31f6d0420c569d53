//! Install `doc_apply(doc, ops)`: applies a patch to a JSONB document.
//!
//! `ops` is an array of `{"path": [..], "set": v}` or `{"path": [..], "inc": n}`.
//! Missing or non-object parents along a path become `{}`; `inc` on a missing
//! or non-numeric value starts from zero. The store issues every write as a
//! single `INSERT .. ON CONFLICT DO UPDATE SET doc = doc_apply(..)` so each
//! call is atomic per document.
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const CREATE_FN: &str = r#"
CREATE OR REPLACE FUNCTION doc_apply(doc jsonb, ops jsonb) RETURNS jsonb AS $$
DECLARE
    op jsonb;
    path text[];
    cur jsonb;
    i int;
BEGIN
    doc := COALESCE(doc, '{}'::jsonb);
    FOR op IN SELECT value FROM jsonb_array_elements(COALESCE(ops, '[]'::jsonb)) LOOP
        path := ARRAY(SELECT jsonb_array_elements_text(op->'path'));
        IF COALESCE(array_length(path, 1), 0) = 0 THEN
            CONTINUE;
        END IF;
        FOR i IN 1 .. array_length(path, 1) - 1 LOOP
            IF jsonb_typeof(doc #> path[1:i]) IS DISTINCT FROM 'object' THEN
                doc := jsonb_set(doc, path[1:i], '{}'::jsonb, true);
            END IF;
        END LOOP;
        IF op ? 'inc' THEN
            cur := doc #> path;
            IF jsonb_typeof(cur) = 'number' THEN
                doc := jsonb_set(doc, path, to_jsonb((cur #>> '{}')::numeric + (op->>'inc')::numeric), true);
            ELSE
                doc := jsonb_set(doc, path, op->'inc', true);
            END IF;
        ELSE
            doc := jsonb_set(doc, path, op->'set', true);
        END IF;
    END LOOP;
    RETURN doc;
END;
$$ LANGUAGE plpgsql IMMUTABLE;
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.get_connection().execute_unprepared(CREATE_FN).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP FUNCTION IF EXISTS doc_apply(jsonb, jsonb)")
            .await?;
        Ok(())
    }
}
