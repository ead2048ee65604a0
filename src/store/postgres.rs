//! Postgres-backed implementation of the index gateway.
//!
//! Storage layout (see `migrations/`): SimHash is persisted both whole and as
//! four 16-bit chunk columns so Hamming ≤ 3 lookups reduce to four equality
//! probes; band hashes live in a `BIGINT[]` with a GIN index for array
//! overlap; the MinHash signature is a `BIGINT[128]` with u64 values
//! bit-cast to i64.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::fingerprint::{Fingerprint, simhash};
use crate::util::error::{Error, Result, from_sqlx};

use super::gateway::IndexGateway;
use super::models::{
    Article, ArticleDoc, ArticleFilter, ArticleState, AssignmentWrite, CandidateRow, Cluster,
    ClusterMutation, ClusterStatus, MemberSketch, Page, Tag, TermWeight, TopicRef,
};

#[derive(Debug, Clone)]
pub(crate) struct PgIndexGateway {
    pool: PgPool,
}

impl PgIndexGateway {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn encode_u64s(values: &[u64]) -> Vec<i64> {
    values.iter().map(|&v| v as i64).collect()
}

fn decode_u64s(values: Vec<i64>) -> Vec<u64> {
    values.into_iter().map(|v| v as u64).collect()
}

fn decode_article_row(row: &PgRow) -> Result<ArticleDoc> {
    let state_raw: i16 = row.try_get("state").map_err(from_sqlx)?;
    let state = ArticleState::from_i16(state_raw)
        .ok_or_else(|| Error::internal(anyhow::anyhow!("invalid article state {state_raw}")))?;

    let status_raw: String = row.try_get("cluster_status").map_err(from_sqlx)?;
    let cluster_status = ClusterStatus::from_str(&status_raw)
        .ok_or_else(|| Error::internal(anyhow::anyhow!("invalid cluster status {status_raw}")))?;

    let tags: sqlx::types::Json<Vec<Tag>> = row.try_get("tags").map_err(from_sqlx)?;
    let topic: sqlx::types::Json<Vec<TopicRef>> = row.try_get("topic").map_err(from_sqlx)?;

    let simhash_raw: i64 = row.try_get("simhash").map_err(from_sqlx)?;
    let minhash: Vec<i64> = row.try_get("minhash").map_err(from_sqlx)?;
    let bands: Vec<i64> = row.try_get("lsh_bands").map_err(from_sqlx)?;

    Ok(ArticleDoc {
        article: Article {
            article_id: row.try_get("article_id").map_err(from_sqlx)?,
            title: row.try_get("title").map_err(from_sqlx)?,
            content: row.try_get("content").map_err(from_sqlx)?,
            publish_time: row.try_get("publish_time").map_err(from_sqlx)?,
            source: row.try_get("source").map_err(from_sqlx)?,
            state,
            top: row.try_get("top_flag").map_err(from_sqlx)?,
            tags: tags.0,
            topic: topic.0,
            cluster_id: row.try_get("cluster_id").map_err(from_sqlx)?,
            cluster_status,
            similarity_score: row.try_get("similarity_score").map_err(from_sqlx)?,
            created_at: row.try_get("created_at").map_err(from_sqlx)?,
            updated_at: row.try_get("updated_at").map_err(from_sqlx)?,
        },
        fingerprint: Fingerprint {
            simhash: simhash_raw as u64,
            minhash: decode_u64s(minhash),
            bands: decode_u64s(bands),
        },
        version: row.try_get("version").map_err(from_sqlx)?,
    })
}

fn decode_candidate_row(row: &PgRow) -> Result<CandidateRow> {
    let state_raw: i16 = row.try_get("state").map_err(from_sqlx)?;
    let state = ArticleState::from_i16(state_raw)
        .ok_or_else(|| Error::internal(anyhow::anyhow!("invalid article state {state_raw}")))?;

    let simhash_raw: i64 = row.try_get("simhash").map_err(from_sqlx)?;
    let bands: Vec<i64> = row.try_get("lsh_bands").map_err(from_sqlx)?;

    Ok(CandidateRow {
        article_id: row.try_get("article_id").map_err(from_sqlx)?,
        simhash: simhash_raw as u64,
        bands: decode_u64s(bands),
        cluster_id: row.try_get("cluster_id").map_err(from_sqlx)?,
        state,
    })
}

fn decode_cluster_row(row: &PgRow) -> Result<Cluster> {
    let centroid: Vec<i64> = row.try_get("centroid_minhash").map_err(from_sqlx)?;
    let top_terms: sqlx::types::Json<Vec<TermWeight>> =
        row.try_get("top_terms").map_err(from_sqlx)?;

    Ok(Cluster {
        cluster_id: row.try_get("cluster_id").map_err(from_sqlx)?,
        article_ids: row.try_get("article_ids").map_err(from_sqlx)?,
        size: row.try_get("size").map_err(from_sqlx)?,
        representative_article_id: row
            .try_get("representative_article_id")
            .map_err(from_sqlx)?,
        representative_score: row.try_get("representative_score").map_err(from_sqlx)?,
        centroid_minhash: decode_u64s(centroid),
        top_terms: top_terms.0,
        last_updated: row.try_get("last_updated").map_err(from_sqlx)?,
        version: row.try_get("version").map_err(from_sqlx)?,
    })
}

const ARTICLE_COLUMNS: &str = "article_id, title, content, publish_time, source, state, \
     top_flag, tags, topic, cluster_id, cluster_status, similarity_score, \
     simhash, minhash, lsh_bands, version, created_at, updated_at";

const CANDIDATE_COLUMNS: &str = "article_id, simhash, lsh_bands, cluster_id, state";

const CLUSTER_COLUMNS: &str = "cluster_id, article_ids, size, representative_article_id, \
     representative_score, centroid_minhash, top_terms, last_updated, version";

#[async_trait]
impl IndexGateway for PgIndexGateway {
    async fn upsert_article(&self, doc: &ArticleDoc) -> Result<()> {
        let article = &doc.article;
        let chunks = simhash::chunk16(doc.fingerprint.simhash);

        sqlx::query(
            r"
            INSERT INTO articles
                (article_id, title, content, publish_time, source, state, top_flag,
                 tags, topic, cluster_id, cluster_status, similarity_score,
                 simhash, simhash_c0, simhash_c1, simhash_c2, simhash_c3,
                 minhash, lsh_bands, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, 1, NOW(), NOW())
            ON CONFLICT (article_id) DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                publish_time = EXCLUDED.publish_time,
                source = EXCLUDED.source,
                state = EXCLUDED.state,
                top_flag = EXCLUDED.top_flag,
                tags = EXCLUDED.tags,
                topic = EXCLUDED.topic,
                simhash = EXCLUDED.simhash,
                simhash_c0 = EXCLUDED.simhash_c0,
                simhash_c1 = EXCLUDED.simhash_c1,
                simhash_c2 = EXCLUDED.simhash_c2,
                simhash_c3 = EXCLUDED.simhash_c3,
                minhash = EXCLUDED.minhash,
                lsh_bands = EXCLUDED.lsh_bands,
                version = articles.version + 1,
                updated_at = NOW()
            ",
        )
        .bind(&article.article_id)
        .bind(&article.title)
        .bind(&article.content)
        .bind(article.publish_time)
        .bind(&article.source)
        .bind(article.state.as_i16())
        .bind(article.top)
        .bind(sqlx::types::Json(&article.tags))
        .bind(sqlx::types::Json(&article.topic))
        .bind(&article.cluster_id)
        .bind(article.cluster_status.as_str())
        .bind(article.similarity_score)
        .bind(doc.fingerprint.simhash as i64)
        .bind(i32::from(chunks[0]))
        .bind(i32::from(chunks[1]))
        .bind(i32::from(chunks[2]))
        .bind(i32::from(chunks[3]))
        .bind(encode_u64s(&doc.fingerprint.minhash))
        .bind(encode_u64s(&doc.fingerprint.bands))
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        Ok(())
    }

    async fn get_article(&self, article_id: &str) -> Result<Option<ArticleDoc>> {
        let row = sqlx::query(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE article_id = $1"
        ))
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx)?;

        row.as_ref().map(decode_article_row).transpose()
    }

    async fn update_assignment(
        &self,
        article_id: &str,
        assignment: &AssignmentWrite,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE articles
            SET cluster_id = $2,
                cluster_status = $3,
                similarity_score = $4,
                version = version + 1,
                updated_at = NOW()
            WHERE article_id = $1
            ",
        )
        .bind(article_id)
        .bind(&assignment.cluster_id)
        .bind(assignment.cluster_status.as_str())
        .bind(assignment.similarity_score)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(Error::ArticleNotFound(article_id.to_string()));
        }
        Ok(())
    }

    async fn claim_for_cluster(
        &self,
        article_id: &str,
        cluster_id: &str,
        score: f64,
        expected_version: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE articles
            SET cluster_id = $2,
                cluster_status = 'matched',
                similarity_score = $3,
                version = version + 1,
                updated_at = NOW()
            WHERE article_id = $1
              AND version = $4
              AND cluster_status <> 'matched'
            ",
        )
        .bind(article_id)
        .bind(cluster_id)
        .bind(score)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_pending(&self, article_id: &str) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE articles
            SET cluster_status = 'pending',
                version = version + 1,
                updated_at = NOW()
            WHERE article_id = $1
            ",
        )
        .bind(article_id)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(Error::ArticleNotFound(article_id.to_string()));
        }
        Ok(())
    }

    async fn search_articles(
        &self,
        filter: &ArticleFilter,
        page: Page,
    ) -> Result<Vec<ArticleDoc>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {ARTICLE_COLUMNS} FROM articles
            WHERE ($1::text IS NULL OR source = $1)
              AND ($2::smallint IS NULL OR state = $2)
              AND ($3::text IS NULL OR cluster_status = $3)
              AND ($4::timestamptz IS NULL OR publish_time >= $4)
              AND ($5::timestamptz IS NULL OR publish_time <= $5)
              AND ($6::boolean IS NULL OR top_flag = $6)
            ORDER BY publish_time DESC, article_id
            LIMIT $7 OFFSET $8
            "
        ))
        .bind(&filter.source)
        .bind(filter.state.map(ArticleState::as_i16))
        .bind(filter.cluster_status.map(ClusterStatus::as_str))
        .bind(filter.published_since)
        .bind(filter.published_until)
        .bind(filter.top)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        rows.iter().map(decode_article_row).collect()
    }

    async fn find_by_simhash(
        &self,
        probe: u64,
        max_hamming: u32,
        limit: usize,
    ) -> Result<Vec<CandidateRow>> {
        let chunks = simhash::chunk16(probe);

        let rows = sqlx::query(&format!(
            r"
            SELECT {CANDIDATE_COLUMNS} FROM articles
            WHERE simhash_c0 = $1 OR simhash_c1 = $2
               OR simhash_c2 = $3 OR simhash_c3 = $4
            LIMIT $5
            "
        ))
        .bind(i32::from(chunks[0]))
        .bind(i32::from(chunks[1]))
        .bind(i32::from(chunks[2]))
        .bind(i32::from(chunks[3]))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        // Chunk equality is only a prefilter; enforce the exact distance.
        let mut out = Vec::new();
        for row in &rows {
            let candidate = decode_candidate_row(row)?;
            if simhash::hamming(candidate.simhash, probe) <= max_hamming {
                out.push(candidate);
            }
        }
        Ok(out)
    }

    async fn find_by_lsh_bands(&self, bands: &[u64], limit: usize) -> Result<Vec<CandidateRow>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {CANDIDATE_COLUMNS} FROM articles
            WHERE lsh_bands && $1::bigint[]
            LIMIT $2
            "
        ))
        .bind(encode_u64s(bands))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        rows.iter().map(decode_candidate_row).collect()
    }

    async fn get_member_sketches(&self, article_ids: &[String]) -> Result<Vec<MemberSketch>> {
        let rows = sqlx::query(
            r"
            SELECT article_id, minhash, title, publish_time
            FROM articles
            WHERE article_id = ANY($1)
            ",
        )
        .bind(article_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx)?;

        rows.iter()
            .map(|row| {
                let minhash: Vec<i64> = row.try_get("minhash").map_err(from_sqlx)?;
                Ok(MemberSketch {
                    article_id: row.try_get("article_id").map_err(from_sqlx)?,
                    minhash: decode_u64s(minhash),
                    title: row.try_get("title").map_err(from_sqlx)?,
                    publish_time: row.try_get("publish_time").map_err(from_sqlx)?,
                })
            })
            .collect()
    }

    async fn get_cluster(&self, cluster_id: &str) -> Result<Option<Cluster>> {
        let row = sqlx::query(&format!(
            "SELECT {CLUSTER_COLUMNS} FROM clusters WHERE cluster_id = $1"
        ))
        .bind(cluster_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx)?;

        row.as_ref().map(decode_cluster_row).transpose()
    }

    async fn create_cluster(&self, cluster: &Cluster) -> Result<()> {
        let result = sqlx::query(
            r"
            INSERT INTO clusters
                (cluster_id, article_ids, size, representative_article_id,
                 representative_score, centroid_minhash, top_terms, last_updated,
                 version, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 1, NOW())
            ON CONFLICT (cluster_id) DO NOTHING
            ",
        )
        .bind(&cluster.cluster_id)
        .bind(&cluster.article_ids)
        .bind(cluster.size)
        .bind(&cluster.representative_article_id)
        .bind(cluster.representative_score)
        .bind(encode_u64s(&cluster.centroid_minhash))
        .bind(sqlx::types::Json(&cluster.top_terms))
        .bind(cluster.last_updated)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(cluster.cluster_id.clone()));
        }
        Ok(())
    }

    async fn append_to_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()> {
        self.replace_cluster(cluster_id, mutation, expected_version)
            .await
    }

    async fn delete_article_from_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()> {
        if mutation.size == 0 {
            let result = sqlx::query("DELETE FROM clusters WHERE cluster_id = $1 AND version = $2")
                .bind(cluster_id)
                .bind(expected_version)
                .execute(&self.pool)
                .await
                .map_err(from_sqlx)?;

            if result.rows_affected() == 0 {
                return Err(Error::Conflict(cluster_id.to_string()));
            }
            return Ok(());
        }

        self.replace_cluster(cluster_id, mutation, expected_version)
            .await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(from_sqlx)?;
        Ok(())
    }
}

impl PgIndexGateway {
    async fn replace_cluster(
        &self,
        cluster_id: &str,
        mutation: &ClusterMutation,
        expected_version: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r"
            UPDATE clusters
            SET article_ids = $2,
                size = $3,
                representative_article_id = $4,
                representative_score = $5,
                centroid_minhash = $6,
                top_terms = $7,
                last_updated = $8,
                version = version + 1
            WHERE cluster_id = $1 AND version = $9
            ",
        )
        .bind(cluster_id)
        .bind(&mutation.article_ids)
        .bind(mutation.size)
        .bind(&mutation.representative_article_id)
        .bind(mutation.representative_score)
        .bind(encode_u64s(&mutation.centroid_minhash))
        .bind(sqlx::types::Json(&mutation.top_terms))
        .bind(mutation.last_updated)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(Error::Conflict(cluster_id.to_string()));
        }
        Ok(())
    }
}
