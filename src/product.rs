//! Products, product classes and the vehicle types that carry them.
use crate::id::{define_id_getter, define_id_type};
use crate::mode::ModeID;
use indexmap::IndexMap;

define_id_type! {ProductID}
define_id_type! {ProductClassID}
define_id_type! {VehicleTypeID}

/// A map of [`Product`]s, keyed by product ID
pub type ProductMap = IndexMap<ProductID, Product>;

/// A map of [`VehicleType`]s, keyed by vehicle type ID
pub type VehicleTypeMap = IndexMap<VehicleTypeID, VehicleType>;

/// A product (commodity group) shipped through the network
#[derive(PartialEq, Debug, Clone)]
pub struct Product {
    /// Unique identifier for the product
    pub id: ProductID,
    /// The class the product belongs to, which determines the vehicles able to carry it
    pub class: ProductClassID,
}
define_id_getter! {Product, ProductID}

/// A type of vehicle, serving one product class on one mode
#[derive(PartialEq, Debug, Clone)]
pub struct VehicleType {
    /// Unique identifier for the vehicle type
    pub id: VehicleTypeID,
    /// The mode the vehicle operates on
    pub mode: ModeID,
    /// The product class the vehicle carries
    pub product_class: ProductClassID,
}
define_id_getter! {VehicleType, VehicleTypeID}

/// Iterate over the vehicle types operating on the given mode
pub fn iter_vehicle_types_for_mode<'a>(
    vehicle_types: &'a VehicleTypeMap,
    mode: &'a ModeID,
) -> impl Iterator<Item = &'a VehicleType> {
    vehicle_types.values().filter(move |v| v.mode == *mode)
}

/// Find the vehicle type serving a product class on a mode, if any
pub fn find_vehicle_type<'a>(
    vehicle_types: &'a VehicleTypeMap,
    mode: &ModeID,
    product_class: &ProductClassID,
) -> Option<&'a VehicleType> {
    vehicle_types
        .values()
        .find(|v| v.mode == *mode && v.product_class == *product_class)
}

/// Iterate over the products a vehicle type can carry
pub fn iter_products_for_vehicle<'a>(
    products: &'a ProductMap,
    vehicle_type: &'a VehicleType,
) -> impl Iterator<Item = &'a Product> {
    products
        .values()
        .filter(move |p| p.class == vehicle_type.product_class)
}
