//! # Deduplicator
//!
//! Collapses observations that describe the same physical sighting. Two keys
//! are checked per record: the exact id, and a species + rounded-coordinate
//! cell (3 decimals ≈ 100 m) that catches the same sighting reported by two
//! providers with slightly different coordinates or ids.
//!
//! First seen wins. The orchestrator concatenates primary-index records
//! ahead of provider records, so the primary copy survives.

use std::collections::HashSet;

use crate::models::Observation;

pub fn dedup(observations: Vec<Observation>, grid_precision: u32) -> Vec<Observation> {
    let scale = 10f64.powi(grid_precision as i32);

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut seen_cells: HashSet<(String, i64, i64)> = HashSet::new();
    let mut retained = Vec::with_capacity(observations.len());

    for observation in observations {
        let cell = (
            observation.scientific_name.to_ascii_lowercase(),
            (observation.latitude * scale).round() as i64,
            (observation.longitude * scale).round() as i64,
        );

        if seen_ids.contains(&observation.id) || seen_cells.contains(&cell) {
            continue;
        }

        seen_ids.insert(observation.id.clone());
        seen_cells.insert(cell);
        retained.push(observation);
    }

    retained
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::models::Source;

    fn observation(id: &str, species: &str, lat: f64, lng: f64, source: Source) -> Observation {
        Observation {
            id: id.to_string(),
            scientific_name: species.to_string(),
            common_name: None,
            latitude: lat,
            longitude: lng,
            timestamp: Utc::now(),
            source,
            verified: false,
            image_url: None,
            thumbnail_url: None,
            location: None,
            habitat: None,
            notes: None,
            observer: None,
            source_url: None,
            external_id: None,
        }
    }

    #[test]
    fn exact_id_duplicates_collapse() {
        let input = vec![
            observation("mindex-1", "Amanita muscaria", 47.1, -122.1, Source::Mindex),
            observation("mindex-1", "Amanita muscaria", 48.9, -120.4, Source::Mindex),
        ];
        assert_eq!(dedup(input, 3).len(), 1);
    }

    #[test]
    fn nearby_same_species_collapses() {
        // Both round to the same 3-decimal cell.
        let input = vec![
            observation("mindex-1", "Amanita muscaria", 47.12341, -122.45322, Source::Mindex),
            observation("gbif-9", "Amanita muscaria", 47.12349, -122.45318, Source::Gbif),
        ];
        assert_eq!(dedup(input, 3).len(), 1);
    }

    #[test]
    fn distant_same_species_does_not_collapse() {
        // 0.002 degrees apart lands in different cells.
        let input = vec![
            observation("mindex-1", "Amanita muscaria", 47.1234, -122.4532, Source::Mindex),
            observation("gbif-9", "Amanita muscaria", 47.1254, -122.4532, Source::Gbif),
        ];
        assert_eq!(dedup(input, 3).len(), 2);
    }

    #[test]
    fn same_cell_different_species_does_not_collapse() {
        let input = vec![
            observation("mindex-1", "Amanita muscaria", 47.1234, -122.4532, Source::Mindex),
            observation("gbif-9", "Boletus edulis", 47.1234, -122.4532, Source::Gbif),
        ];
        assert_eq!(dedup(input, 3).len(), 2);
    }

    #[test]
    fn first_seen_wins_so_primary_survives() {
        let input = vec![
            observation("mindex-1", "Amanita muscaria", 47.1234, -122.4532, Source::Mindex),
            observation("inat-55", "Amanita muscaria", 47.12341, -122.45321, Source::INaturalist),
        ];
        let retained = dedup(input, 3);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].source, Source::Mindex);
        assert_eq!(retained[0].id, "mindex-1");
    }

    #[test]
    fn dedup_is_idempotent() {
        let input = vec![
            observation("mindex-1", "Amanita muscaria", 47.1234, -122.4532, Source::Mindex),
            observation("inat-55", "Amanita muscaria", 47.12341, -122.45321, Source::INaturalist),
            observation("gbif-9", "Boletus edulis", 59.33, 18.07, Source::Gbif),
        ];
        let once = dedup(input, 3);
        let twice = dedup(once.clone(), 3);
        assert_eq!(
            once.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(),
            twice.iter().map(|o| o.id.as_str()).collect::<Vec<_>>()
        );
    }
}
