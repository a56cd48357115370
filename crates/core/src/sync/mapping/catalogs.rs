//! Code tables of the remote accounting service: identification types,
//! payment types, cash accounts and DANE municipality codes.

/// Remote code for a local identification document type. Unknown types
/// are treated as a citizen id.
pub fn id_type_code(id_type: &str) -> &'static str {
    match id_type.trim().to_ascii_uppercase().as_str() {
        "CE" => "22",
        "NIT" => "31",
        "TI" => "12",
        "PA" => "41",
        "RC" => "11",
        "PEP" => "42",
        "PPT" => "47",
        "SC" => "43",
        // CC, DNI, NUIP and CD all map to a citizen id.
        _ => "13",
    }
}

/// Remote payment type id for a local payment method name.
pub fn payment_type_id(method: &str) -> u32 {
    match normalize_method(method).as_str() {
        "tarjeta" | "tarjeta_credito" | "tarjeta_debito" | "epayco" | "nequi" | "daviplata" => {
            10_490
        }
        "transferencia" | "consignacion" | "pse" | "credito" => 5_636,
        "cheque" => 5_637,
        _ => 10_489,
    }
}

/// Ledger account a payment lands in: cash on hand for cash, national
/// banks for everything else.
pub fn receipt_account(method: &str) -> &'static str {
    match normalize_method(method).as_str() {
        "" | "efectivo" => "11050501",
        _ => "11100501",
    }
}

/// `(state_code, city_code)` for a city, falling back to the department
/// capital and then to Bogotá.
pub fn city_codes(city: Option<&str>, department: Option<&str>) -> (String, String) {
    let city_code = city
        .and_then(|name| lookup(CITIES, &fold(name)))
        .or_else(|| department.and_then(|name| lookup(CAPITALS, &fold(name))))
        .unwrap_or(BOGOTA);
    (city_code[..2].to_string(), city_code.to_string())
}

const BOGOTA: &str = "11001";

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(name, _)| *name == key).map(|(_, code)| *code)
}

/// Lowercase, trim and strip Spanish accents.
fn fold(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn normalize_method(method: &str) -> String {
    fold(method)
        .chars()
        .map(|c| if c.is_ascii_lowercase() { c } else { '_' })
        .collect()
}

const CITIES: &[(&str, &str)] = &[
    ("bogota", "11001"),
    ("medellin", "05001"),
    ("bello", "05088"),
    ("itagui", "05360"),
    ("envigado", "05266"),
    ("rionegro", "05615"),
    ("cali", "76001"),
    ("palmira", "76520"),
    ("buenaventura", "76109"),
    ("tulua", "76834"),
    ("barranquilla", "08001"),
    ("soledad", "08758"),
    ("malambo", "08433"),
    ("bucaramanga", "68001"),
    ("floridablanca", "68276"),
    ("giron", "68307"),
    ("piedecuesta", "68547"),
    ("soacha", "25754"),
    ("chia", "25175"),
    ("zipaquira", "25899"),
    ("facatativa", "25269"),
    ("fusagasuga", "25290"),
    ("cartagena", "13001"),
    ("magangue", "13430"),
    ("cucuta", "54001"),
    ("pamplona", "54518"),
    ("ibague", "73001"),
    ("espinal", "73268"),
    ("pasto", "52001"),
    ("tumaco", "52835"),
    ("ipiales", "52356"),
    ("pereira", "66001"),
    ("dosquebradas", "66170"),
    ("manizales", "17001"),
    ("la dorada", "17380"),
    ("monteria", "23001"),
    ("lorica", "23417"),
    ("villavicencio", "50001"),
    ("acacias", "50006"),
    ("neiva", "41001"),
    ("pitalito", "41551"),
    ("valledupar", "20001"),
    ("aguachica", "20011"),
    ("armenia", "63001"),
    ("calarca", "63130"),
    ("tunja", "15001"),
    ("duitama", "15238"),
    ("sogamoso", "15759"),
    ("santa marta", "47001"),
    ("cienaga", "47189"),
    ("popayan", "19001"),
    ("santander de quilichao", "19698"),
    ("riohacha", "44001"),
    ("maicao", "44430"),
    ("sincelejo", "70001"),
    ("corozal", "70215"),
    ("yopal", "85001"),
    ("arauca", "81001"),
    ("mocoa", "86001"),
    ("florencia", "18001"),
    ("quibdo", "27001"),
    ("san andres", "88001"),
    ("leticia", "91001"),
    ("san jose del guaviare", "95001"),
    ("mitu", "97001"),
    ("puerto carreno", "99001"),
    ("inirida", "94001"),
];

const CAPITALS: &[(&str, &str)] = &[
    ("amazonas", "91001"),
    ("antioquia", "05001"),
    ("arauca", "81001"),
    ("atlantico", "08001"),
    ("bogota", "11001"),
    ("bolivar", "13001"),
    ("boyaca", "15001"),
    ("caldas", "17001"),
    ("caqueta", "18001"),
    ("casanare", "85001"),
    ("cauca", "19001"),
    ("cesar", "20001"),
    ("choco", "27001"),
    ("cordoba", "23001"),
    ("cundinamarca", "25001"),
    ("guainia", "94001"),
    ("guaviare", "95001"),
    ("huila", "41001"),
    ("la guajira", "44001"),
    ("magdalena", "47001"),
    ("meta", "50001"),
    ("narino", "52001"),
    ("norte de santander", "54001"),
    ("putumayo", "86001"),
    ("quindio", "63001"),
    ("risaralda", "66001"),
    ("san andres", "88001"),
    ("santander", "68001"),
    ("sucre", "70001"),
    ("tolima", "73001"),
    ("valle del cauca", "76001"),
    ("vaupes", "97001"),
    ("vichada", "99001"),
];
