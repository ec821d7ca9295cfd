use crate::database::{Store, StoreError};
use crate::models::{Image, ImageStatus, Item};

impl Store {
    pub fn image(&self, id: &str) -> Result<Image, StoreError> {
        self.fetch::<Item>(id)?
            .into_image()
            .ok_or_else(|| StoreError::NotAnImage(id.to_string()))
    }

    pub fn update_image<F>(&self, id: &str, apply: F) -> Result<Image, StoreError>
    where
        F: FnOnce(&mut Image) -> Result<(), StoreError>,
    {
        self.update::<Item, _>(id, |item| match item {
            Item::Image(image) => apply(image),
            Item::Sample(_) | Item::Annotation(_) | Item::Observation(_) => {
                Err(StoreError::NotAnImage(id.to_string()))
            }
        })?
        .into_image()
        .ok_or_else(|| StoreError::NotAnImage(id.to_string()))
    }

    pub fn images_with_status<P>(&self, predicate: P) -> Result<Vec<Image>, StoreError>
    where
        P: Fn(ImageStatus) -> bool,
    {
        Ok(self
            .all::<Item>()?
            .into_iter()
            .filter_map(Item::into_image)
            .filter(|image| predicate(image.status()))
            .collect())
    }
}
