use crate::deme::DemeId;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use std::collections::HashMap;
use tumor_common::{Coord, Neighborhood};

/// Sparse lattice with at most one deme per site.
#[derive(Debug, Default)]
pub struct Lattice {
    sites: HashMap<Coord, DemeId>,
    locations: HashMap<DemeId, Coord>,
}

impl Lattice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `deme` at `coord`. The site must be free and the deme unplaced.
    pub fn occupy(&mut self, deme: DemeId, coord: Coord) -> Result<()> {
        if let Some(existing) = self.sites.get(&coord) {
            anyhow::bail!("Site {:?} is already occupied by deme {}; cannot place {}.", coord, existing, deme);
        }
        if let Some(current) = self.locations.get(&deme) {
            anyhow::bail!("Deme {} already occupies {:?}.", deme, current);
        }
        self.sites.insert(coord, deme);
        self.locations.insert(deme, coord);
        Ok(())
    }

    /// Removes `deme` from the lattice and returns the site it held.
    pub fn vacate(&mut self, deme: DemeId) -> Result<Coord> {
        let coord = self
            .locations
            .remove(&deme)
            .ok_or_else(|| anyhow::anyhow!("Deme {} is not on the lattice.", deme))?;
        self.sites.remove(&coord);
        Ok(coord)
    }

    pub fn locate(&self, deme: DemeId) -> Option<Coord> {
        self.locations.get(&deme).copied()
    }

    pub fn occupant(&self, coord: Coord) -> Option<DemeId> {
        self.sites.get(&coord).copied()
    }

    pub fn is_occupied(&self, coord: Coord) -> bool {
        self.sites.contains_key(&coord)
    }

    /// Number of occupied sites.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Free sites adjacent to `deme`, in neighborhood offset order.
    pub fn available_neighbors(&self, deme: DemeId, neighborhood: Neighborhood) -> Result<Vec<Coord>> {
        let center = self
            .locate(deme)
            .ok_or_else(|| anyhow::anyhow!("Deme {} is not on the lattice.", deme))?;
        Ok(neighborhood.around(center).filter(|c| !self.is_occupied(*c)).collect())
    }

    pub fn has_available_neighbor(&self, deme: DemeId, neighborhood: Neighborhood) -> Result<bool> {
        let center = self
            .locate(deme)
            .ok_or_else(|| anyhow::anyhow!("Deme {} is not on the lattice.", deme))?;
        Ok(neighborhood.around(center).any(|c| !self.is_occupied(c)))
    }

    /// A free site adjacent to `deme`, chosen uniformly; `None` if every neighbor is taken.
    pub fn find_available(&self, deme: DemeId, neighborhood: Neighborhood, rng: &mut StdRng) -> Result<Option<Coord>> {
        let available = self.available_neighbors(deme, neighborhood)?;
        Ok(available.choose(rng).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_occupancy_is_exclusive() {
        let mut lattice = Lattice::new();
        lattice.occupy(DemeId(0), Coord::ORIGIN).unwrap();
        assert!(lattice.occupy(DemeId(1), Coord::ORIGIN).is_err());
        assert!(lattice.occupy(DemeId(0), Coord::planar(1, 0)).is_err());
        assert_eq!(lattice.locate(DemeId(0)), Some(Coord::ORIGIN));
        assert_eq!(lattice.occupant(Coord::ORIGIN), Some(DemeId(0)));

        assert_eq!(lattice.vacate(DemeId(0)).unwrap(), Coord::ORIGIN);
        assert!(lattice.is_empty());
        assert!(lattice.vacate(DemeId(0)).is_err());
        lattice.occupy(DemeId(1), Coord::ORIGIN).unwrap();
    }

    #[test]
    fn test_available_neighbors_shrink_as_sites_fill() {
        let mut lattice = Lattice::new();
        let neighborhood = Neighborhood::VonNeumann2d;
        lattice.occupy(DemeId(0), Coord::ORIGIN).unwrap();
        assert_eq!(lattice.available_neighbors(DemeId(0), neighborhood).unwrap().len(), 4);

        for (k, offset) in neighborhood.offsets().iter().enumerate() {
            assert!(lattice.has_available_neighbor(DemeId(0), neighborhood).unwrap());
            lattice.occupy(DemeId(k as u32 + 1), *offset).unwrap();
        }
        assert!(!lattice.has_available_neighbor(DemeId(0), neighborhood).unwrap());
        let mut rng = StdRng::seed_from_u64(42);
        assert_eq!(lattice.find_available(DemeId(0), neighborhood, &mut rng).unwrap(), None);
        // The Moore neighborhood still has the diagonals.
        assert!(lattice.has_available_neighbor(DemeId(0), Neighborhood::Moore2d).unwrap());
    }

    #[test]
    fn test_find_available_is_uniform_over_free_sites() {
        let mut lattice = Lattice::new();
        lattice.occupy(DemeId(0), Coord::ORIGIN).unwrap();
        lattice.occupy(DemeId(1), Coord::planar(1, 0)).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let mut hits: HashMap<Coord, u32> = HashMap::new();
        for _ in 0..3000 {
            let site = lattice.find_available(DemeId(0), Neighborhood::VonNeumann2d, &mut rng).unwrap().unwrap();
            *hits.entry(site).or_default() += 1;
        }
        assert_eq!(hits.len(), 3);
        assert!(!hits.contains_key(&Coord::planar(1, 0)));
        assert!(hits.values().all(|n| (800..1200).contains(n)));
    }

    #[test]
    fn test_unplaced_deme_is_an_error() {
        let lattice = Lattice::new();
        assert!(lattice.has_available_neighbor(DemeId(3), Neighborhood::Moore2d).is_err());
    }
}
