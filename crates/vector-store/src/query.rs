use crate::embeddings::ImageEncoder;
use crate::error::{Result, VectorStoreError};
use crate::images::decode_image;
use crate::similarity::{cosine_similarity, is_zero_vector};
use crate::store::EmbeddingStore;
use crate::types::{MatchResult, RankedMatch};
use image::DynamicImage;
use std::path::Path;

/// Exhaustive cosine-similarity search over a loaded store.
///
/// Scores every record on every query; ties go to the record that comes first
/// in store order.
pub struct QueryEngine<'a> {
    store: &'a EmbeddingStore,
}

impl<'a> QueryEngine<'a> {
    #[must_use]
    pub const fn new(store: &'a EmbeddingStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub const fn store(&self) -> &'a EmbeddingStore {
        self.store
    }

    /// Embed `image` with `encoder` and return the best match.
    pub async fn query_image(
        &self,
        encoder: &dyn ImageEncoder,
        image: DynamicImage,
    ) -> Result<MatchResult> {
        self.check_encoder(encoder)?;
        let vector = encoder.encode(image).await?;
        self.query_vector(&vector)
    }

    pub async fn query_path(
        &self,
        encoder: &dyn ImageEncoder,
        path: impl AsRef<Path>,
    ) -> Result<MatchResult> {
        self.check_encoder(encoder)?;
        let image = decode_image(path.as_ref()).await?;
        let vector = encoder.encode(image).await?;
        self.query_vector(&vector)
    }

    /// Best match for an already computed query vector.
    pub fn query_vector(&self, query: &[f32]) -> Result<MatchResult> {
        self.validate_query(query)?;

        let mut best = MatchResult::no_match();
        for record in self.store.iter() {
            let score = cosine_similarity(query, &record.vector)?;
            if score > best.score {
                best.score = score;
                best.best_identifier = Some(record.identifier.clone());
            }
        }

        match &best.best_identifier {
            Some(id) => log::debug!("Best match '{id}' (score {:.4})", best.score),
            None => log::debug!("Empty store, no match"),
        }
        Ok(best)
    }

    /// The `limit` best records in descending score. Equal scores keep store
    /// order.
    pub fn top_matches(&self, query: &[f32], limit: usize) -> Result<Vec<RankedMatch>> {
        self.validate_query(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut scored = Vec::with_capacity(self.store.len());
        for (position, record) in self.store.iter().enumerate() {
            scored.push(RankedMatch {
                identifier: record.identifier.clone(),
                score: cosine_similarity(query, &record.vector)?,
                position,
            });
        }

        // Stable sort keeps earlier records ahead on ties.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Reject an encoder whose configuration differs from the one the store
    /// was built with. Stores without a recorded encoder are not checked.
    pub fn check_encoder(&self, encoder: &dyn ImageEncoder) -> Result<()> {
        let Some(expected) = self.store.encoder() else {
            return Ok(());
        };
        let actual = encoder.fingerprint();
        if *expected != actual {
            return Err(VectorStoreError::EncoderMismatch {
                store: expected.to_string(),
                query: actual.to_string(),
            });
        }
        Ok(())
    }

    fn validate_query(&self, query: &[f32]) -> Result<()> {
        if let Some(expected) = self.store.dimension() {
            if query.len() != expected {
                return Err(VectorStoreError::InvalidDimension {
                    expected,
                    actual: query.len(),
                });
            }
        }
        if is_zero_vector(query) {
            return Err(VectorStoreError::ZeroVector);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{EmbeddingRecord, EncoderFingerprint};
    use pretty_assertions::assert_eq;

    fn toy_store() -> EmbeddingStore {
        EmbeddingStore::from_records(
            vec![
                EmbeddingRecord::new("A", vec![1.0, 0.0]),
                EmbeddingRecord::new("B", vec![0.0, 1.0]),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn toy_store_matches() {
        let store = toy_store();
        let engine = QueryEngine::new(&store);

        let result = engine.query_vector(&[1.0, 0.0]).unwrap();
        assert_eq!(result.best_identifier.as_deref(), Some("A"));
        assert!((result.score - 1.0).abs() < 1e-6);

        let result = engine.query_vector(&[0.0, 1.0]).unwrap();
        assert_eq!(result.best_identifier.as_deref(), Some("B"));
        assert!((result.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ties_go_to_first_record() {
        let store = toy_store();
        let engine = QueryEngine::new(&store);

        let result = engine.query_vector(&[0.7071, 0.7071]).unwrap();
        assert_eq!(result.best_identifier.as_deref(), Some("A"));
        assert!((result.score - 0.7071).abs() < 1e-3);

        let reversed = EmbeddingStore::from_records(
            vec![
                EmbeddingRecord::new("B", vec![0.0, 1.0]),
                EmbeddingRecord::new("A", vec![1.0, 0.0]),
            ],
            None,
        )
        .unwrap();
        let result = QueryEngine::new(&reversed)
            .query_vector(&[0.7071, 0.7071])
            .unwrap();
        assert_eq!(result.best_identifier.as_deref(), Some("B"));
    }

    #[test]
    fn empty_store_has_no_match() {
        let store = EmbeddingStore::new();
        let result = QueryEngine::new(&store).query_vector(&[0.2, 0.4]).unwrap();
        assert_eq!(result.best_identifier, None);
        assert_eq!(result.score, MatchResult::NO_MATCH_SCORE);
        assert!(!result.is_match());
    }

    #[test]
    fn single_record_store_returns_it_with_exact_score() {
        let store = EmbeddingStore::from_records(
            vec![EmbeddingRecord::new("only.png", vec![0.3, -0.2, 0.9])],
            None,
        )
        .unwrap();
        let engine = QueryEngine::new(&store);
        for query in [vec![1.0, 0.0, 0.0], vec![-0.3, 0.2, -0.9], vec![5.0, 4.0, 3.0]] {
            let result = engine.query_vector(&query).unwrap();
            assert_eq!(result.best_identifier.as_deref(), Some("only.png"));
            let expected = cosine_similarity(&query, &store.records()[0].vector).unwrap();
            assert_eq!(result.score, expected);
        }
    }

    #[test]
    fn query_dimension_mismatch_is_invalid_input() {
        let store = toy_store();
        let err = QueryEngine::new(&store)
            .query_vector(&[1.0, 0.0, 0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::InvalidDimension {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn empty_store_with_encoder_still_checks_dimension() {
        let store = EmbeddingStore::with_encoder(EncoderFingerprint::new("m", false, 4));
        let engine = QueryEngine::new(&store);
        assert!(engine.query_vector(&[1.0, 0.0]).is_err());
        assert!(!engine.query_vector(&[1.0, 0.0, 0.0, 0.0]).unwrap().is_match());
    }

    #[test]
    fn zero_query_is_invalid_input() {
        let store = toy_store();
        let err = QueryEngine::new(&store).query_vector(&[0.0, 0.0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn top_matches_orders_by_score_then_store_order() {
        let store = EmbeddingStore::from_records(
            vec![
                EmbeddingRecord::new("x", vec![0.0, 1.0]),
                EmbeddingRecord::new("a", vec![1.0, 0.0]),
                EmbeddingRecord::new("b", vec![2.0, 0.0]),
                EmbeddingRecord::new("c", vec![1.0, 1.0]),
            ],
            None,
        )
        .unwrap();
        let engine = QueryEngine::new(&store);

        let ranked = engine.top_matches(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|m| m.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(ranked[0].position, 1);
        assert_eq!(ranked[1].position, 2);

        let best = engine.query_vector(&[1.0, 0.0]).unwrap();
        assert_eq!(best.best_identifier.as_deref(), Some(ranked[0].identifier.as_str()));
        assert_eq!(best.score, ranked[0].score);

        assert!(engine.top_matches(&[1.0, 0.0], 0).unwrap().is_empty());
        assert_eq!(engine.top_matches(&[1.0, 0.0], 10).unwrap().len(), 4);
    }

    struct FixedEncoder(EncoderFingerprint);

    #[async_trait::async_trait]
    impl ImageEncoder for FixedEncoder {
        fn fingerprint(&self) -> EncoderFingerprint {
            self.0.clone()
        }

        async fn encode(&self, _image: DynamicImage) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn encoder_fingerprint_must_match() {
        let built_with = EncoderFingerprint::new("clip-vit-base-patch16", false, 2);
        let mut store = EmbeddingStore::with_encoder(built_with.clone());
        store.insert(EmbeddingRecord::new("A", vec![1.0, 0.0])).unwrap();
        let engine = QueryEngine::new(&store);
        let image = DynamicImage::new_rgb8(2, 2);

        let result = engine
            .query_image(&FixedEncoder(built_with), image.clone())
            .await
            .unwrap();
        assert_eq!(result.best_identifier.as_deref(), Some("A"));

        let quantized = FixedEncoder(EncoderFingerprint::new("clip-vit-base-patch16", true, 2));
        let err = engine.query_image(&quantized, image).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::EncoderMismatch { .. }), "{err}");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
