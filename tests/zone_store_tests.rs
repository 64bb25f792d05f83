//! Zone store policy tests

#[cfg(test)]
mod tests {
    use ring_stream::chunk::ChunkId;
    use ring_stream::error::RingError;
    use ring_stream::geometry::{Point, Polygon, ZoneGeometry};
    use ring_stream::types::{StreamingConfig, ZoneBoundingBox};
    use ring_stream::wrap::{CHUNK_COUNT, RING_CIRCUMFERENCE_F};
    use ring_stream::zones::*;

    const C: f64 = RING_CIRCUMFERENCE_F;

    fn store() -> InMemoryZoneStore {
        InMemoryZoneStore::new(StreamingConfig::default())
    }

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> ZoneGeometry {
        ZoneGeometry::Polygon(Polygon::rectangle(min_x, min_y, max_x, max_y))
    }

    fn seam_rect(west: f64, east: f64, min_y: f64, max_y: f64) -> ZoneGeometry {
        ZoneGeometry::Polygon(Polygon::new(
            vec![
                Point::new(C - west, min_y),
                Point::new(east, min_y),
                Point::new(east, max_y),
                Point::new(C - west, max_y),
                Point::new(C - west, min_y),
            ],
            Vec::new(),
        ))
    }

    fn input(name: &str, zone_type: &str, owner: Option<i64>, geometry: ZoneGeometry) -> ZoneCreateInput {
        ZoneCreateInput {
            name: name.to_string(),
            zone_type: zone_type.to_string(),
            floor: 0,
            owner_id: owner,
            is_system_zone: false,
            properties: Default::default(),
            geometry,
            conflict_resolution: None,
        }
    }

    fn system(name: &str, geometry: ZoneGeometry) -> ZoneCreateInput {
        ZoneCreateInput {
            is_system_zone: true,
            ..input(name, "restricted", None, geometry)
        }
    }

    fn box_s(min_s: f64, max_s: f64) -> ZoneBoundingBox {
        ZoneBoundingBox {
            floor: 0,
            min_s,
            max_s,
            min_r: -2_500.0,
            max_r: 2_500.0,
            min_z: -2_500.0,
            max_z: 2_500.0,
        }
    }

    // -----------------------------------------------------------------------
    // Create & merge
    // -----------------------------------------------------------------------

    #[test]
    fn create_assigns_ids_and_area() {
        let zones = store();
        let result = zones
            .create_zone(input("plot", "residential", Some(1), rect(0.0, 0.0, 100.0, 50.0)))
            .expect("created");
        assert_eq!(result.created.len(), 1);
        assert!(result.updated.is_empty() && result.deleted.is_empty());

        let zone = &result.created[0];
        assert_eq!(zone.id, 1);
        assert_eq!(zone.revision, 1);
        assert!((zone.area - 5_000.0).abs() < 1e-6);
        assert_eq!(zones.get_zone(1), Some(zone.clone()));
    }

    #[test]
    fn overlapping_same_kind_merges_into_oldest() {
        let zones = store();
        zones
            .create_zone(input("a", "residential", Some(1), rect(0.0, 0.0, 100.0, 50.0)))
            .expect("a");
        let result = zones
            .create_zone(input("b", "residential", Some(1), rect(50.0, 0.0, 150.0, 50.0)))
            .expect("b");

        assert!(result.created.is_empty());
        assert_eq!(result.updated.len(), 1);
        let merged = &result.updated[0];
        assert_eq!(merged.id, 1);
        assert_eq!(merged.name, "a");
        assert_eq!(merged.revision, 2);
        assert!((merged.area - 7_500.0).abs() < 0.5);
        assert_eq!(zones.len(), 1);
    }

    #[test]
    fn merge_is_transitive() {
        let zones = store();
        zones
            .create_zone(input("west", "park", Some(1), rect(0.0, 0.0, 10.0, 10.0)))
            .expect("west");
        zones
            .create_zone(input("east", "park", Some(1), rect(100.0, 0.0, 110.0, 10.0)))
            .expect("east");
        assert_eq!(zones.len(), 2);

        let result = zones
            .create_zone(input("bridge", "park", Some(1), rect(5.0, 2.0, 105.0, 8.0)))
            .expect("bridge");
        assert_eq!(result.deleted, vec![2]);
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].id, 1);
        assert_eq!(zones.len(), 1);
        assert!(zones.get_zone(2).is_none());

        // 100 + 100 + 90 * 6 of bridge outside both.
        assert!((result.updated[0].area - 740.0).abs() < 0.5);
    }

    #[test]
    fn merge_across_seam() {
        let zones = store();
        zones
            .create_zone(input("origin", "residential", Some(1), rect(0.0, 0.0, 10.0, 20.0)))
            .expect("origin");
        let result = zones
            .create_zone(input(
                "wrapped",
                "residential",
                Some(1),
                seam_rect(5.0, 15.0, 10.0, 40.0),
            ))
            .expect("wrapped");

        assert_eq!(zones.len(), 1);
        let merged = &result.updated[0];
        assert_eq!(merged.id, 1);
        // Larger than either input, smaller than their sum.
        assert!(merged.area > 600.0 && merged.area < 800.0);
        assert!((merged.area - 700.0).abs() < 0.5);
        assert!(merged.geometry.points().all(|p| p.x >= 0.0 && p.x < C));
    }

    #[test]
    fn different_owner_or_type_does_not_merge() {
        let zones = store();
        zones
            .create_zone(input("mine", "residential", Some(1), rect(0.0, 0.0, 100.0, 50.0)))
            .expect("mine");
        zones
            .create_zone(input("theirs", "residential", Some(2), rect(50.0, 0.0, 150.0, 50.0)))
            .expect("theirs");
        zones
            .create_zone(input("shop", "commercial", Some(3), rect(50.0, 0.0, 150.0, 50.0)))
            .expect("shop");
        assert_eq!(zones.len(), 3);
        assert_eq!(zones.list_by_owner(2).len(), 1);
        assert_eq!(zones.list_by_floor(0).len(), 3);
        assert!(zones.list_by_floor(1).is_empty());
    }

    #[test]
    fn disjoint_multi_polygon_creates_one_zone_per_piece() {
        let zones = store();
        let geometry = ZoneGeometry::MultiPolygon(vec![
            Polygon::rectangle(0.0, 0.0, 10.0, 10.0),
            Polygon::rectangle(100.0, 0.0, 110.0, 10.0),
        ]);
        let result = zones
            .create_zone(input("pair", "farm", Some(1), geometry))
            .expect("pair");
        assert_eq!(result.created.len(), 2);
        assert_eq!(zones.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------

    fn with_residential() -> InMemoryZoneStore {
        let zones = store();
        zones
            .create_zone(input("home", "residential", Some(1), rect(0.0, 0.0, 100.0, 10.0)))
            .expect("home");
        zones
    }

    #[test]
    fn same_owner_different_type_needs_resolution() {
        let zones = with_residential();
        let err = zones
            .create_zone(input("shop", "commercial", Some(1), rect(40.0, -5.0, 60.0, 15.0)))
            .expect_err("conflict");
        match err {
            RingError::ZoneConflict {
                conflicts,
                new_zone_type,
            } => {
                assert_eq!(new_zone_type, "commercial");
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts[0].id, 1);
                assert_eq!(conflicts[0].zone_type, "residential");
            }
            other => panic!("unexpected error {:?}", other),
        }
        // Nothing changed.
        assert_eq!(zones.len(), 1);
        assert_eq!(zones.get_zone(1).map(|z| z.revision), Some(1));
    }

    #[test]
    fn new_wins_cuts_existing_zone() {
        let zones = with_residential();
        let mut shop = input("shop", "commercial", Some(1), rect(40.0, -5.0, 60.0, 15.0));
        shop.conflict_resolution = Some(ConflictResolution::NewWins);
        let result = zones.create_zone(shop).expect("new wins");

        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.updated[0].id, 1);
        // The second residential piece plus the shop.
        assert_eq!(result.created.len(), 2);
        assert_eq!(zones.len(), 3);

        let residential: f64 = zones
            .list_by_owner(1)
            .iter()
            .filter(|z| z.zone_type == "residential")
            .map(|z| z.area)
            .sum();
        assert!((residential - 800.0).abs() < 0.5);
        let shop = result
            .created
            .iter()
            .find(|z| z.zone_type == "commercial")
            .expect("shop");
        assert!((shop.area - 400.0).abs() < 0.5);
    }

    #[test]
    fn existing_wins_cuts_new_zone() {
        let zones = with_residential();
        let mut shop = input("shop", "commercial", Some(1), rect(40.0, -5.0, 60.0, 15.0));
        shop.conflict_resolution = Some(ConflictResolution::ExistingWins);
        let result = zones.create_zone(shop).expect("existing wins");

        assert!(result.updated.is_empty());
        assert_eq!(result.created.len(), 2);
        for piece in &result.created {
            assert!((piece.area - 100.0).abs() < 0.5);
        }
        assert_eq!(zones.get_zone(1).map(|z| z.revision), Some(1));
    }

    #[test]
    fn existing_wins_fully_covered_is_rejected() {
        let zones = with_residential();
        let mut shop = input("shop", "commercial", Some(1), rect(10.0, 2.0, 20.0, 8.0));
        shop.conflict_resolution = Some(ConflictResolution::ExistingWins);
        assert!(matches!(
            zones.create_zone(shop),
            Err(RingError::InvalidRequest(_))
        ));
        assert_eq!(zones.len(), 1);
    }

    // -----------------------------------------------------------------------
    // System zones
    // -----------------------------------------------------------------------

    #[test]
    fn system_zone_keeps_its_area() {
        let zones = store();
        zones
            .create_zone(system("pillar", rect(0.0, 0.0, 100.0, 100.0)))
            .expect("system");
        let result = zones
            .create_zone(input("plot", "residential", Some(1), rect(50.0, 0.0, 150.0, 50.0)))
            .expect("plot");

        let plot = &result.created[0];
        assert!((plot.area - 2_500.0).abs() < 0.5);
        let system_zone = zones.get_zone(1).expect("system zone");
        assert_eq!(system_zone.revision, 1);
        assert!((system_zone.area - 10_000.0).abs() < 1e-6);
    }

    #[test]
    fn zone_inside_system_zone_is_rejected() {
        let zones = store();
        zones
            .create_zone(system("pillar", rect(0.0, 0.0, 100.0, 100.0)))
            .expect("system");
        assert!(matches!(
            zones.create_zone(input("plot", "residential", Some(1), rect(10.0, 10.0, 20.0, 20.0))),
            Err(RingError::InvalidRequest(_))
        ));
        assert_eq!(zones.len(), 1);
    }

    // -----------------------------------------------------------------------
    // Dezone
    // -----------------------------------------------------------------------

    #[test]
    fn dezone_splits_owned_zone() {
        let zones = with_residential();
        let result = zones
            .dezone(0, &rect(40.0, -5.0, 60.0, 15.0), 1)
            .expect("dezone");
        assert_eq!(result.updated.len(), 1);
        assert_eq!(result.created.len(), 1);
        assert!(result.deleted.is_empty());
        assert_eq!(zones.len(), 2);
        for zone in zones.list_by_owner(1) {
            assert!((zone.area - 400.0).abs() < 0.5);
        }
    }

    #[test]
    fn dezone_deletes_consumed_zone() {
        let zones = with_residential();
        let result = zones
            .dezone(0, &rect(0.0, -10.0, 110.0, 20.0), 1)
            .expect("dezone");
        assert_eq!(result.deleted, vec![1]);
        assert!(zones.is_empty());
    }

    #[test]
    fn dezone_ignores_other_owners_and_system_zones() {
        let zones = with_residential();
        zones
            .create_zone(system("pillar", rect(200.0, 0.0, 300.0, 10.0)))
            .expect("system");

        let result = zones
            .dezone(0, &rect(0.0, -10.0, 400.0, 20.0), 2)
            .expect("other editor");
        assert_eq!(result, DezoneResult::default());

        let result = zones
            .dezone(0, &rect(150.0, -10.0, 400.0, 20.0), 1)
            .expect("system only");
        assert_eq!(result, DezoneResult::default());
        assert_eq!(zones.len(), 2);
    }

    // -----------------------------------------------------------------------
    // Validation, queries, edits
    // -----------------------------------------------------------------------

    #[test]
    fn create_validates_input() {
        let zones = store();
        assert!(matches!(
            zones.create_zone(input(" ", "residential", Some(1), rect(0.0, 0.0, 1.0, 1.0))),
            Err(RingError::InvalidRequest(_))
        ));
        assert!(matches!(
            zones.create_zone(input("x", "", Some(1), rect(0.0, 0.0, 1.0, 1.0))),
            Err(RingError::InvalidRequest(_))
        ));
        let mut high = input("x", "residential", Some(1), rect(0.0, 0.0, 1.0, 1.0));
        high.floor = 5;
        assert!(matches!(zones.create_zone(high), Err(RingError::InvalidRequest(_))));
        assert!(matches!(
            zones.create_zone(input("x", "residential", Some(1), rect(0.0, 0.0, 1.0, 3_000.0))),
            Err(RingError::InvalidGeometry(_))
        ));
        assert!(zones.is_empty());
    }

    #[test]
    fn non_canonical_x_is_rejected() {
        let zones = with_residential();
        for bad in [
            rect(-5_000.0, 0.0, -4_000.0, 10.0),
            rect(3.0 * C + 100.0, 0.0, 3.0 * C + 200.0, 10.0),
            rect(0.0, 0.0, 1e17, 10.0),
        ] {
            assert!(matches!(
                zones.create_zone(input("x", "park", Some(1), bad.clone())),
                Err(RingError::InvalidGeometry(_))
            ));
            assert!(matches!(
                zones.update_zone(
                    1,
                    ZoneUpdateInput {
                        geometry: Some(bad.clone()),
                        ..Default::default()
                    }
                ),
                Err(RingError::InvalidGeometry(_))
            ));
            assert!(matches!(zones.dezone(0, &bad, 1), Err(RingError::InvalidGeometry(_))));
        }
        assert_eq!(zones.len(), 1);
        assert_eq!(zones.get_zone(1).map(|z| z.revision), Some(1));

        // Both ends of the ring are valid stored coordinates.
        assert!(zones
            .create_zone(input("end", "park", Some(1), rect(C - 10.0, 20.0, C, 30.0)))
            .is_ok());
    }

    // -----------------------------------------------------------------------
    // Failed edits
    // -----------------------------------------------------------------------

    fn saved(id: i64, owner: i64, geometry: ZoneGeometry) -> Zone {
        Zone {
            id,
            name: format!("saved-{}", id),
            zone_type: "residential".into(),
            floor: 0,
            owner_id: Some(owner),
            is_system_zone: false,
            properties: Default::default(),
            area: 0.0,
            geometry,
            revision: 1,
        }
    }

    /// Flat ring: closed and finite, but with no area.
    fn collapsed(min_x: f64, max_x: f64) -> ZoneGeometry {
        ZoneGeometry::Polygon(Polygon::new(
            vec![
                Point::new(min_x, 0.0),
                Point::new((min_x + max_x) / 2.0, 0.0),
                Point::new(max_x, 0.0),
                Point::new(min_x, 0.0),
            ],
            Vec::new(),
        ))
    }

    fn store_with_broken_zone() -> InMemoryZoneStore {
        InMemoryZoneStore::with_zones(
            StreamingConfig::default(),
            vec![
                saved(1, 1, rect(0.0, 0.0, 100.0, 10.0)),
                saved(2, 1, collapsed(150.0, 350.0)),
            ],
        )
    }

    #[test]
    fn loaded_zones_keep_their_ids() {
        let zones = store_with_broken_zone();
        assert_eq!(zones.len(), 2);
        let created = zones
            .create_zone(input("far", "park", Some(9), rect(90_000.0, 0.0, 90_010.0, 10.0)));
        // The broken zone sits on the same floor, so even a distant create
        // fails and nothing is stored.
        assert!(matches!(created, Err(RingError::InvalidGeometry(_))));
        assert_eq!(zones.len(), 2);

        let fresh = InMemoryZoneStore::with_zones(
            StreamingConfig::default(),
            vec![saved(7, 1, rect(0.0, 0.0, 10.0, 10.0))],
        );
        let result = fresh
            .create_zone(input("next", "park", Some(2), rect(500.0, 0.0, 510.0, 10.0)))
            .expect("create");
        assert_eq!(result.created[0].id, 8);
    }

    #[test]
    fn failed_dezone_leaves_store_untouched() {
        let zones = store_with_broken_zone();
        let before = zones.list_by_floor(0);

        // Zone 1 is a valid target; zone 2 can't be processed.
        let result = zones.dezone(0, &rect(40.0, -5.0, 400.0, 15.0), 1);
        assert!(matches!(result, Err(RingError::InvalidGeometry(_))));
        assert_eq!(zones.list_by_floor(0), before);
    }

    #[test]
    fn failed_create_leaves_store_untouched() {
        let zones = store_with_broken_zone();
        let before = zones.list_by_floor(0);

        let mut shop = input("shop", "commercial", Some(1), rect(40.0, -5.0, 60.0, 15.0));
        shop.conflict_resolution = Some(ConflictResolution::NewWins);
        assert!(matches!(zones.create_zone(shop), Err(RingError::InvalidGeometry(_))));
        assert_eq!(zones.list_by_floor(0), before);
    }

    #[test]
    fn spatial_queries_skip_broken_zones() {
        let zones = store_with_broken_zone();
        assert_eq!(zones.zones_in_box(&box_s(0.0, 1_000.0)), vec![1]);
        assert_eq!(zones.zones_overlapping_chunk(ChunkId::new(0, 0)), vec![1]);
    }

    #[test]
    fn zones_in_box_handles_wrapping() {
        let zones = store();
        zones
            .create_zone(input("seam", "park", Some(1), seam_rect(100.0, 100.0, 0.0, 10.0)))
            .expect("seam");
        zones
            .create_zone(input("far", "park", Some(1), rect(50_000.0, 0.0, 50_100.0, 10.0)))
            .expect("far");

        assert_eq!(zones.zones_in_box(&box_s(C - 50.0, 50.0)), vec![1]);
        assert_eq!(zones.zones_in_box(&box_s(50.0, 60.0)), vec![1]);
        assert_eq!(zones.zones_in_box(&box_s(C - 60.0, C - 50.0)), vec![1]);
        assert!(zones.zones_in_box(&box_s(1_000.0, 2_000.0)).is_empty());
        assert_eq!(zones.zones_in_box(&box_s(C - 1_000.0, 60_000.0)), vec![1, 2]);

        let mut other_floor = box_s(C - 50.0, 50.0);
        other_floor.floor = 1;
        assert!(zones.zones_in_box(&other_floor).is_empty());

        let mut off_axis = box_s(C - 50.0, 50.0);
        off_axis.min_r = 100.0;
        off_axis.max_r = 200.0;
        assert!(zones.zones_in_box(&off_axis).is_empty());
    }

    #[test]
    fn zones_overlapping_chunk() {
        let zones = store();
        zones
            .create_zone(input("lot", "farm", Some(1), rect(1_500.0, 0.0, 2_500.0, 10.0)))
            .expect("lot");
        zones
            .create_zone(input("seam", "farm", Some(2), seam_rect(100.0, 100.0, 0.0, 10.0)))
            .expect("seam");

        zones
            .create_zone(input("edge", "farm", Some(3), rect(2_600.0, 0.0, 3_000.0, 10.0)))
            .expect("edge");

        assert_eq!(zones.zones_overlapping_chunk(ChunkId::new(0, 1)), vec![1]);
        assert_eq!(zones.zones_overlapping_chunk(ChunkId::new(0, 2)), vec![1, 3]);
        // Ending exactly where chunk 3 starts is not overlap.
        assert!(zones.zones_overlapping_chunk(ChunkId::new(0, 3)).is_empty());
        assert_eq!(zones.zones_overlapping_chunk(ChunkId::new(0, 0)), vec![2]);
        assert_eq!(zones.zones_overlapping_chunk(ChunkId::new(0, CHUNK_COUNT - 1)), vec![2]);
        assert!(zones.zones_overlapping_chunk(ChunkId::new(1, 1)).is_empty());
    }

    #[test]
    fn update_and_delete() {
        let zones = with_residential();
        let updated = zones
            .update_zone(
                1,
                ZoneUpdateInput {
                    name: Some("renamed".into()),
                    geometry: Some(rect(0.0, 0.0, 50.0, 10.0)),
                    ..Default::default()
                },
            )
            .expect("update");
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.revision, 2);
        assert!((updated.area - 500.0).abs() < 1e-6);

        assert!(matches!(
            zones.update_zone(
                1,
                ZoneUpdateInput {
                    name: Some(String::new()),
                    ..Default::default()
                }
            ),
            Err(RingError::InvalidRequest(_))
        ));
        assert!(matches!(
            zones.update_zone(9, ZoneUpdateInput::default()),
            Err(RingError::ZoneNotFound(9))
        ));

        assert_eq!(zones.delete_zone(1).map(|z| z.id), Ok(1));
        assert_eq!(zones.delete_zone(1), Err(RingError::ZoneNotFound(1)));
        assert!(zones.get_zone(1).is_none());
    }
}
