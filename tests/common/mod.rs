//! Shared fixture domain for the integration tests
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use cim_graph_ogm::{
    CascadePolicy, DescriptorRegistry, ElementId, EndpointDescriptor, Entity, EntityDescriptor, EntityRecord,
    GraphSession, InMemoryGraphStore, MappingError, OgmConfig, PropertyKind, RelationshipDescriptor,
};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vehicle {
    Car,
    Motorbike,
    Bicycle,
}

impl fmt::Display for Vehicle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Vehicle::Car => "CAR",
            Vehicle::Motorbike => "MOTORBIKE",
            Vehicle::Bicycle => "BICYCLE",
        })
    }
}

impl FromStr for Vehicle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CAR" => Ok(Vehicle::Car),
            "MOTORBIKE" => Ok(Vehicle::Motorbike),
            "BICYCLE" => Ok(Vehicle::Bicycle),
            other => Err(format!("unknown vehicle {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PetType {
    Dog,
    Cat,
}

impl fmt::Display for PetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PetType::Dog => "DOG",
            PetType::Cat => "CAT",
        })
    }
}

impl FromStr for PetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DOG" => Ok(PetType::Dog),
            "CAT" => Ok(PetType::Cat),
            other => Err(format!("unknown pet type {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    pub area_code: String,
}

impl Area {
    pub fn descriptor() -> EntityDescriptor {
        EntityDescriptor::embedded("Area").property("areaCode", PropertyKind::String)
    }

    fn to_record(&self) -> EntityRecord {
        EntityRecord::new("Area").set("areaCode", self.area_code.as_str())
    }

    fn from_record(record: &EntityRecord) -> Self {
        Self {
            area_code: record.string("areaCode"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub id: Option<ElementId>,
    pub country: String,
    pub city: String,
    pub street: String,
    pub area: Option<Area>,
}

impl Address {
    pub fn new(country: &str, city: &str, street: &str, area_code: &str) -> Self {
        Self {
            id: None,
            country: country.to_string(),
            city: city.to_string(),
            street: street.to_string(),
            area: Some(Area {
                area_code: area_code.to_string(),
            }),
        }
    }
}

impl Entity for Address {
    const NAME: &'static str = "Address";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::vertex(Self::NAME)
            .property("country", PropertyKind::String)
            .property("city", PropertyKind::String)
            .property("street", PropertyKind::String)
            .embed("area", Area::descriptor())
    }

    fn to_record(&self) -> EntityRecord {
        EntityRecord::new(Self::NAME)
            .with_id(self.id)
            .set("country", self.country.as_str())
            .set("city", self.city.as_str())
            .set("street", self.street.as_str())
            .embed("area", self.area.as_ref().map(Area::to_record))
    }

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError> {
        record.expect_entity(Self::NAME)?;
        Ok(Self {
            id: record.id,
            country: record.string("country"),
            city: record.string("city"),
            street: record.string("street"),
            area: record.embedded("area").map(Area::from_record),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pet {
    pub id: Option<ElementId>,
    pub name: String,
    pub kind: Option<PetType>,
}

impl Pet {
    pub fn new(name: &str, kind: PetType) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            kind: Some(kind),
        }
    }
}

impl Entity for Pet {
    const NAME: &'static str = "Pet";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::vertex(Self::NAME)
            .required_property("name", PropertyKind::String)
            .property("type", PropertyKind::Enum)
    }

    fn to_record(&self) -> EntityRecord {
        EntityRecord::new(Self::NAME)
            .with_id(self.id)
            .set("name", self.name.as_str())
            .set("type", self.kind.map(|k| k.to_string()))
    }

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError> {
        record.expect_entity(Self::NAME)?;
        Ok(Self {
            id: record.id,
            name: record.string("name"),
            kind: record.enum_value("type"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct House {
    pub id: Option<ElementId>,
    pub rooms: i64,
}

impl House {
    pub fn new(rooms: i64) -> Self {
        Self { id: None, rooms }
    }
}

impl Entity for House {
    const NAME: &'static str = "House";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::vertex(Self::NAME).property("rooms", PropertyKind::Integer)
    }

    fn to_record(&self) -> EntityRecord {
        EntityRecord::new(Self::NAME).with_id(self.id).set("rooms", self.rooms)
    }

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError> {
        record.expect_entity(Self::NAME)?;
        Ok(Self {
            id: record.id,
            rooms: record.integer("rooms"),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: Option<ElementId>,
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            id: None,
            latitude,
            longitude,
        }
    }
}

impl Entity for Location {
    const NAME: &'static str = "Location";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::vertex(Self::NAME)
            .property("latitude", PropertyKind::Float)
            .property("longitude", PropertyKind::Float)
    }

    fn to_record(&self) -> EntityRecord {
        EntityRecord::new(Self::NAME)
            .with_id(self.id)
            .set("latitude", self.latitude)
            .set("longitude", self.longitude)
    }

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError> {
        record.expect_entity(Self::NAME)?;
        Ok(Self {
            id: record.id,
            latitude: record.float("latitude"),
            longitude: record.float("longitude"),
        })
    }
}

/// Edge entity from a person to a location they visited
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub id: Option<ElementId>,
    pub date: Option<DateTime<Utc>>,
    pub person: Option<ElementId>,
    pub location: Option<Location>,
}

impl Located {
    pub fn at(location: Location, date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            date: Some(date),
            person: None,
            location: Some(location),
        }
    }
}

impl Entity for Located {
    const NAME: &'static str = "Located";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::edge(
            Self::NAME,
            EndpointDescriptor::new("person", "Person"),
            EndpointDescriptor::new("location", "Location").cascade_save(),
        )
        .property("date", PropertyKind::Date)
    }

    fn to_record(&self) -> EntityRecord {
        EntityRecord::new(Self::NAME)
            .with_id(self.id)
            .set("date", self.date)
            .one("person", self.person.map(|id| EntityRecord::reference("Person", id)))
            .one("location", self.location.as_ref().map(Location::to_record))
    }

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError> {
        record.expect_entity(Self::NAME)?;
        Ok(Self {
            id: record.id,
            date: record.date("date"),
            person: record.target("person").and_then(|p| p.id),
            location: record.target_as("location")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Person {
    pub id: Option<ElementId>,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub age: i64,
    pub vehicles: Vec<Vehicle>,
    pub address: Option<Address>,
    pub pets: Vec<Pet>,
    pub favourite_pet: Option<Pet>,
    pub owns: Option<House>,
    pub owned: Vec<House>,
    pub locations: Vec<Located>,
    pub current_location: Option<Located>,
}

impl Person {
    pub fn new(first_name: &str, last_name: &str, address: Option<Address>, active: bool) -> Self {
        Self {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            address,
            active,
            ..Self::default()
        }
    }
}

impl Entity for Person {
    const NAME: &'static str = "Person";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::vertex(Self::NAME)
            .required_property("firstName", PropertyKind::String)
            .property("lastName", PropertyKind::String)
            .property("active", PropertyKind::Boolean)
            .property("age", PropertyKind::Integer)
            .property("vehicles", PropertyKind::EnumSet)
            .relationship(RelationshipDescriptor::single("address", "lives_at", "Address").cascade_save())
            .relationship(RelationshipDescriptor::list("pets", "owns_pet", "Pet").cascade_save())
            .relationship(
                RelationshipDescriptor::single("favouritePet", "favourite", "Pet").on_delete(CascadePolicy::Restrict),
            )
            .relationship(
                RelationshipDescriptor::single("owns", "owns", "House")
                    .cascade_save()
                    .on_delete(CascadePolicy::Cascade),
            )
            .relationship(
                RelationshipDescriptor::set("owned", "owns", "House")
                    .cascade_save()
                    .on_delete(CascadePolicy::Cascade),
            )
            .relationship(RelationshipDescriptor::set("locations", "Located", "Located").cascade_save())
            .relationship(RelationshipDescriptor::single("currentLocation", "Located", "Located").cascade_save())
    }

    fn to_record(&self) -> EntityRecord {
        let vehicles: Vec<String> = self.vehicles.iter().map(Vehicle::to_string).collect();
        EntityRecord::new(Self::NAME)
            .with_id(self.id)
            .set("firstName", self.first_name.as_str())
            .set("lastName", self.last_name.as_str())
            .set("active", self.active)
            .set("age", self.age)
            .set("vehicles", vehicles)
            .one("address", self.address.as_ref().map(Address::to_record))
            .many("pets", self.pets.iter().map(Pet::to_record))
            .one("favouritePet", self.favourite_pet.as_ref().map(Pet::to_record))
            .one("owns", self.owns.as_ref().map(House::to_record))
            .many("owned", self.owned.iter().map(House::to_record))
            .many("locations", self.locations.iter().map(Located::to_record))
            .one("currentLocation", self.current_location.as_ref().map(Located::to_record))
    }

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError> {
        record.expect_entity(Self::NAME)?;
        Ok(Self {
            id: record.id,
            first_name: record.string("firstName"),
            last_name: record.string("lastName"),
            active: record.boolean("active"),
            age: record.integer("age"),
            vehicles: record.enum_values("vehicles"),
            address: record.target_as("address")?,
            pets: record.targets_as("pets")?,
            favourite_pet: record.target_as("favouritePet")?,
            owns: record.target_as("owns")?,
            owned: record.targets_as("owned")?,
            locations: record.targets_as("locations")?,
            current_location: record.target_as("currentLocation")?,
        })
    }
}

/// Edge entity between two people
#[derive(Debug, Clone, PartialEq)]
pub struct Likes {
    pub id: Option<ElementId>,
    pub date: Option<DateTime<Utc>>,
    pub person1: Option<Person>,
    pub person2: Option<Person>,
}

impl Likes {
    pub fn new(person1: &Person, person2: &Person, date: Option<DateTime<Utc>>) -> Self {
        Self {
            id: None,
            date,
            person1: Some(person1.clone()),
            person2: Some(person2.clone()),
        }
    }
}

impl Entity for Likes {
    const NAME: &'static str = "Likes";

    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::edge(
            Self::NAME,
            EndpointDescriptor::new("person1", "Person"),
            EndpointDescriptor::new("person2", "Person"),
        )
        .property("date", PropertyKind::Date)
    }

    fn to_record(&self) -> EntityRecord {
        let reference = |p: &Person| match p.id {
            Some(id) => EntityRecord::reference("Person", id),
            None => p.to_record(),
        };
        EntityRecord::new(Self::NAME)
            .with_id(self.id)
            .set("date", self.date)
            .one("person1", self.person1.as_ref().map(reference))
            .one("person2", self.person2.as_ref().map(reference))
    }

    fn from_record(record: &EntityRecord) -> Result<Self, MappingError> {
        record.expect_entity(Self::NAME)?;
        Ok(Self {
            id: record.id,
            date: record.date("date"),
            person1: record.target_as("person1")?,
            person2: record.target_as("person2")?,
        })
    }
}

pub fn registry() -> Arc<DescriptorRegistry> {
    registry_with(OgmConfig::default())
}

pub fn registry_with(config: OgmConfig) -> Arc<DescriptorRegistry> {
    DescriptorRegistry::builder(config)
        .register_entity::<Address>()
        .register_entity::<Pet>()
        .register_entity::<House>()
        .register_entity::<Location>()
        .register_entity::<Located>()
        .register_entity::<Person>()
        .register_entity::<Likes>()
        .build()
        .expect("fixture registry is valid")
}

/// A session on `store` with an open transaction
pub fn begin(store: &InMemoryGraphStore) -> GraphSession {
    let mut session = GraphSession::open(store).expect("store opens");
    session.begin().expect("transaction begins");
    session
}
