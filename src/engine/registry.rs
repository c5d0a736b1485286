use std::collections::{BTreeMap, HashMap};

use crate::limits::*;
use crate::model::*;

use super::EngineError;

/// Owns every accommodation and the owner → ids index.
///
/// Ids come from a counter that only moves forward; nothing is ever removed,
/// so iterating the id-keyed map yields creation order.
#[derive(Debug)]
pub struct AccommodationRegistry {
    next_id: AccommodationId,
    accommodations: BTreeMap<AccommodationId, Accommodation>,
    by_owner: HashMap<Principal, Vec<AccommodationId>>,
}

impl Default for AccommodationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AccommodationRegistry {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            accommodations: BTreeMap::new(),
            by_owner: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.accommodations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accommodations.is_empty()
    }

    pub fn create(
        &mut self,
        caller: &Principal,
        metadata_ref: String,
        price_per_night: Amount,
    ) -> Result<Accommodation, EngineError> {
        if metadata_ref.len() > MAX_METADATA_LEN {
            return Err(EngineError::LimitExceeded("metadata too long"));
        }
        if self.accommodations.len() >= MAX_ACCOMMODATIONS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many accommodations"));
        }

        let id = self.next_id;
        self.next_id += 1;
        let accommodation = Accommodation {
            id,
            owner: caller.clone(),
            metadata_ref,
            price_per_night,
            listed: false,
        };
        self.accommodations.insert(id, accommodation.clone());
        self.by_owner.entry(caller.clone()).or_default().push(id);
        Ok(accommodation)
    }

    /// Resolve `id` and check that `caller` owns it.
    fn owned_mut(
        &mut self,
        caller: &Principal,
        id: AccommodationId,
    ) -> Result<&mut Accommodation, EngineError> {
        let accommodation = self
            .accommodations
            .get_mut(&id)
            .ok_or(EngineError::AccommodationNotFound(id))?;
        if accommodation.owner != *caller {
            return Err(EngineError::NotOwner(id));
        }
        Ok(accommodation)
    }

    pub fn update_price(
        &mut self,
        caller: &Principal,
        id: AccommodationId,
        price_per_night: Amount,
    ) -> Result<Accommodation, EngineError> {
        let accommodation = self.owned_mut(caller, id)?;
        accommodation.price_per_night = price_per_night;
        Ok(accommodation.clone())
    }

    pub fn update_listed_status(
        &mut self,
        caller: &Principal,
        id: AccommodationId,
        listed: bool,
    ) -> Result<Accommodation, EngineError> {
        let accommodation = self.owned_mut(caller, id)?;
        accommodation.listed = listed;
        Ok(accommodation.clone())
    }

    pub fn get(&self, id: AccommodationId) -> Result<&Accommodation, EngineError> {
        self.accommodations
            .get(&id)
            .ok_or(EngineError::AccommodationNotFound(id))
    }

    pub fn owner_of(&self, id: AccommodationId) -> Result<&Principal, EngineError> {
        self.get(id).map(|a| &a.owner)
    }

    pub fn price_of(&self, id: AccommodationId) -> Result<Amount, EngineError> {
        self.get(id).map(|a| a.price_per_night)
    }

    pub fn all(&self) -> Vec<Accommodation> {
        self.accommodations.values().cloned().collect()
    }

    pub fn by_owner(&self, owner: &Principal) -> Vec<Accommodation> {
        self.by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.accommodations.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}
