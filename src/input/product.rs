//! Code for reading products and vehicle types from CSV files.
use super::*;
use crate::mode::ModeMap;
use crate::product::{Product, ProductMap, VehicleType, VehicleTypeMap};
use serde::Deserialize;

const PRODUCTS_FILE_NAME: &str = "products.csv";
const VEHICLE_TYPES_FILE_NAME: &str = "vehicle_types.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct ProductRaw {
    product: String,
    product_class: String,
}

#[derive(PartialEq, Debug, Deserialize)]
struct VehicleTypeRaw {
    mode: String,
    product_class: String,
    vehicle_type: String,
}

/// Read products and their classes.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
pub fn read_products(model_dir: &Path) -> Result<ProductMap> {
    let file_path = model_dir.join(PRODUCTS_FILE_NAME);
    read_products_from_iter(read_csv(&file_path)?).with_context(|| input_err_msg(&file_path))
}

fn read_products_from_iter<I>(iter: I) -> Result<ProductMap>
where
    I: Iterator<Item = ProductRaw>,
{
    let mut products = ProductMap::new();
    for raw in iter {
        let product = Product {
            id: raw.product.into(),
            class: raw.product_class.into(),
        };
        insert_unique(&mut products, product, "product")?;
    }

    Ok(products)
}

/// Read vehicle types.
///
/// Each vehicle type serves one product class on one mode. Every product class a vehicle type
/// serves must contain at least one product, as empty trips are costed using the cheapest
/// product of the class.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `modes` - All modes
/// * `products` - All products
pub fn read_vehicle_types(
    model_dir: &Path,
    modes: &ModeMap,
    products: &ProductMap,
) -> Result<VehicleTypeMap> {
    let file_path = model_dir.join(VEHICLE_TYPES_FILE_NAME);
    read_vehicle_types_from_iter(read_csv(&file_path)?, modes, products)
        .with_context(|| input_err_msg(&file_path))
}

fn read_vehicle_types_from_iter<I>(
    iter: I,
    modes: &ModeMap,
    products: &ProductMap,
) -> Result<VehicleTypeMap>
where
    I: Iterator<Item = VehicleTypeRaw>,
{
    let mut vehicle_types = VehicleTypeMap::new();
    for raw in iter {
        let vehicle = VehicleType {
            id: raw.vehicle_type.into(),
            mode: raw.mode.into(),
            product_class: raw.product_class.into(),
        };
        ensure!(
            modes.contains_key(&vehicle.mode),
            "Unknown mode {} for vehicle type {}",
            vehicle.mode,
            vehicle.id
        );
        ensure!(
            products.values().any(|p| p.class == vehicle.product_class),
            "Vehicle type {} serves product class {}, which has no products",
            vehicle.id,
            vehicle.product_class
        );
        ensure!(
            !vehicle_types
                .values()
                .any(|v| v.mode == vehicle.mode && v.product_class == vehicle.product_class),
            "More than one vehicle type for mode {} and product class {}",
            vehicle.mode,
            vehicle.product_class
        );
        insert_unique(&mut vehicle_types, vehicle, "vehicle type")?;
    }

    Ok(vehicle_types)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, modes, products};
    use rstest::rstest;

    fn vehicle(mode: &str, class: &str, id: &str) -> VehicleTypeRaw {
        VehicleTypeRaw {
            mode: mode.to_string(),
            product_class: class.to_string(),
            vehicle_type: id.to_string(),
        }
    }

    #[test]
    fn test_read_products_from_iter() {
        let raw = |product: &str, class: &str| ProductRaw {
            product: product.to_string(),
            product_class: class.to_string(),
        };
        let products =
            read_products_from_iter([raw("Timber", "Dry bulk"), raw("Ore", "Dry bulk")].into_iter())
                .unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products["Ore"].class, "Dry bulk".into());

        assert_error!(
            read_products_from_iter([raw("Ore", "Dry bulk"), raw("Ore", "Liquid")].into_iter()),
            "Duplicate product Ore"
        );
    }

    #[rstest]
    fn test_read_vehicle_types(modes: ModeMap, products: ProductMap) {
        let vehicle_types = read_vehicle_types_from_iter(
            [vehicle("Road", "Dry bulk", "Truck"), vehicle("Sea", "Dry bulk", "Ship")].into_iter(),
            &modes,
            &products,
        )
        .unwrap();
        assert_eq!(vehicle_types["Ship"].mode, "Sea".into());
    }

    #[rstest]
    #[case(vehicle("Air", "Dry bulk", "Plane"), "Unknown mode Air for vehicle type Plane")]
    #[case(
        vehicle("Road", "Liquid", "Tanker"),
        "Vehicle type Tanker serves product class Liquid, which has no products"
    )]
    fn test_read_vehicle_types_invalid(
        modes: ModeMap,
        products: ProductMap,
        #[case] raw: VehicleTypeRaw,
        #[case] msg: &str,
    ) {
        assert_error!(
            read_vehicle_types_from_iter([raw].into_iter(), &modes, &products),
            msg
        );
    }

    #[rstest]
    fn test_read_vehicle_types_duplicate(modes: ModeMap, products: ProductMap) {
        assert_error!(
            read_vehicle_types_from_iter(
                [vehicle("Road", "Thermo", "A"), vehicle("Road", "Thermo", "B")].into_iter(),
                &modes,
                &products,
            ),
            "More than one vehicle type for mode Road and product class Thermo"
        );
    }
}
