//! Chunk indexing and catalog tests

#[cfg(test)]
mod tests {
    use ring_stream::chunk::*;
    use ring_stream::coords::RingPolar;
    use ring_stream::error::RingError;
    use ring_stream::wrap::{CHUNK_COUNT, RING_CIRCUMFERENCE};
    use std::f64::consts::PI;

    const LAST: u32 = (CHUNK_COUNT - 1) as u32;

    // -----------------------------------------------------------------------
    // Index math
    // -----------------------------------------------------------------------

    #[test]
    fn position_maps_to_chunk() {
        assert_eq!(position_to_chunk_index(0), 0);
        assert_eq!(position_to_chunk_index(999), 0);
        assert_eq!(position_to_chunk_index(1_500), 1);
        assert_eq!(position_to_chunk_index(-1), LAST);
        assert_eq!(position_to_chunk_index(RING_CIRCUMFERENCE), 0);
    }

    #[test]
    fn arc_and_polar_map_to_chunk() {
        assert_eq!(arc_to_chunk_index(999.999), 0);
        assert_eq!(arc_to_chunk_index(-0.5), LAST);
        assert_eq!(arc_to_chunk_index(RING_CIRCUMFERENCE as f64 + 2_500.0), 2);

        // Half way round the ring.
        let idx = ring_polar_to_chunk_index(RingPolar::new(PI, 0.0, 0.0));
        assert_eq!(idx, (CHUNK_COUNT / 2) as u32);
    }

    #[test]
    fn chunk_ranges_and_centers() {
        assert_eq!(chunk_index_to_position_range(0), (0, 1_000));
        assert_eq!(
            chunk_index_to_position_range(-1),
            (RING_CIRCUMFERENCE - 1_000, RING_CIRCUMFERENCE)
        );
        assert_eq!(chunk_index_to_center_arc(0).s, 500.0);
        assert_eq!(chunk_index_to_center_arc(CHUNK_COUNT + 3).s, 3_500.0);

        let polar = chunk_index_to_ring_polar(0);
        assert!(polar.theta > 0.0 && polar.theta < 1e-4);
    }

    #[test]
    fn chunks_in_range_crosses_seam() {
        assert_eq!(chunks_in_range(0, 1_000), vec![LAST, 0, 1]);
        assert_eq!(chunks_in_range(500, 400), vec![0]);
        assert!(chunks_in_range(0, -1).is_empty());
    }

    #[test]
    fn chunks_in_range_covers_ring_without_duplicates() {
        let all = chunks_in_range(0, RING_CIRCUMFERENCE / 2);
        assert_eq!(all.len(), CHUNK_COUNT as usize);

        let near_half = chunks_in_range(123_456, RING_CIRCUMFERENCE / 2 - 1);
        let mut sorted = near_half.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), near_half.len());
    }

    #[test]
    fn chunks_in_range_with_huge_distance_is_whole_ring() {
        assert_eq!(chunks_in_range(42, i64::MAX).len(), CHUNK_COUNT as usize);
        assert_eq!(
            chunks_in_range(-7, 10 * RING_CIRCUMFERENCE).len(),
            CHUNK_COUNT as usize
        );
    }

    // -----------------------------------------------------------------------
    // ChunkId
    // -----------------------------------------------------------------------

    #[test]
    fn chunk_id_text_form() {
        let id = ChunkId::new(2, -1);
        assert_eq!(id.index, LAST);
        assert_eq!(id.to_string(), format!("2_{}", LAST));

        let parsed: ChunkId = "-1_42".parse().expect("valid id");
        assert_eq!(parsed, ChunkId { floor: -1, index: 42 });

        for bad in ["", "3", "a_1", "1_b", "0_264000", "0_-1"] {
            assert!(
                matches!(bad.parse::<ChunkId>(), Err(RingError::InvalidRequest(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn chunk_id_serializes_as_string() {
        let id = ChunkId::new(0, 263_997);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"0_263997\"");
        let back: ChunkId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
        assert!(serde_json::from_str::<ChunkId>("\"nope\"").is_err());
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    #[test]
    fn catalog_creates_metadata_on_demand() {
        let catalog = ChunkCatalog::new(-2..=2);
        assert_eq!(catalog.cached_len(), 0);

        let meta = catalog
            .chunk_metadata(&ChunkId::new(1, 5))
            .expect("floor 1 exists");
        assert_eq!(meta.min_s, 5_000.0);
        assert_eq!(meta.max_s, 6_000.0);
        assert_eq!(meta.center.s, 5_500.0);
        assert_eq!(meta.version, 1);
        assert_eq!(catalog.cached_len(), 0);

        let cached = catalog.get_or_create(ChunkId::new(1, 5)).expect("cached");
        assert_eq!(*cached, *meta);
        assert_eq!(catalog.cached_len(), 1);

        // Later lookups are served from the cache.
        let again = catalog.chunk_metadata(&ChunkId::new(1, 5)).expect("cached");
        assert!(std::sync::Arc::ptr_eq(&cached, &again));
    }

    #[test]
    fn lookups_do_not_grow_cache() {
        let catalog = ChunkCatalog::new(0..=0);
        for idx in 0..1_000 {
            assert!(catalog.chunk_metadata(&ChunkId::new(0, idx)).is_some());
        }
        assert_eq!(catalog.cached_len(), 0);
    }

    #[test]
    fn catalog_rejects_unknown_floor() {
        let catalog = ChunkCatalog::new(-2..=2);
        assert!(catalog.chunk_metadata(&ChunkId::new(3, 0)).is_none());
        assert!(catalog.bump_version(ChunkId::new(-3, 0)).is_err());
    }

    #[test]
    fn bump_version_increments() {
        let catalog = ChunkCatalog::new(0..=0);
        let id = ChunkId::new(0, 7);
        assert_eq!(catalog.get_or_create(id).map(|m| m.version), Some(1));
        assert_eq!(catalog.bump_version(id), Ok(2));
        assert_eq!(catalog.bump_version(id), Ok(3));
        assert_eq!(catalog.get_or_create(id).map(|m| m.version), Some(3));
    }

    #[test]
    fn eviction_uses_cyclic_distance() {
        let catalog = ChunkCatalog::new(0..=0);
        for idx in [0, 3, 10, CHUNK_COUNT - 2] {
            catalog.get_or_create(ChunkId::new(0, idx));
        }
        assert_eq!(catalog.cached_len(), 4);

        catalog.evict_distant_chunks(0, 5);
        assert_eq!(catalog.cached_len(), 3);
        assert!(catalog.chunk_metadata(&ChunkId::new(0, CHUNK_COUNT - 2)).is_some());
    }

    #[test]
    fn eviction_keeps_bumped_versions() {
        let catalog = ChunkCatalog::new(0..=0);
        let far = ChunkId::new(0, 100_000);
        catalog.bump_version(far).expect("bump");
        catalog.get_or_create(ChunkId::new(0, 50_000));

        catalog.evict_distant_chunks(0, 5);
        assert_eq!(catalog.cached_len(), 1);
        assert_eq!(catalog.chunk_metadata(&far).map(|m| m.version), Some(2));
    }
}
