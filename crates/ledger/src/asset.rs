//! Asset record (a production lot) as stored by the asset-transfer chaincode.

use serde::{Deserialize, Serialize};

/// A lot tracked on the ledger.
///
/// Field names on the wire are fixed by the chaincode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "InsumosUtilizados")]
    pub inputs_used: String,
    #[serde(rename = "Tipo")]
    pub kind: String,
    #[serde(rename = "DataInicio")]
    pub start_date: String,
    #[serde(rename = "DataFinal")]
    pub end_date: String,
    #[serde(rename = "Responsavel")]
    pub owner: String,
    #[serde(rename = "Status")]
    pub status: String,
}

impl Asset {
    /// Build from `CreateAsset`/`UpdateAsset` arguments, in chaincode order.
    pub fn from_args(args: &[String]) -> Option<Self> {
        match args {
            [id, inputs_used, kind, start_date, end_date, owner, status] => Some(Self {
                id: id.clone(),
                inputs_used: inputs_used.clone(),
                kind: kind.clone(),
                start_date: start_date.clone(),
                end_date: end_date.clone(),
                owner: owner.clone(),
                status: status.clone(),
            }),
            _ => None,
        }
    }

    /// Arguments after the asset id, in chaincode order.
    pub fn field_args(&self) -> Vec<String> {
        vec![
            self.inputs_used.clone(),
            self.kind.clone(),
            self.start_date.clone(),
            self.end_date.clone(),
            self.owner.clone(),
            self.status.clone(),
        ]
    }

    /// Lots written by `InitLedger`.
    pub fn seed() -> Vec<Asset> {
        [
            ("lote1", "Fertilizante X", "Cultivo e Colheita", "Fazenda A", "Concluído"),
            ("lote2", "Fertilizante Y", "Transporte", "Transportadora A", "Em trânsito"),
            ("lote3", "Fertilizante Y", "Processamento", "Usina A", "Processado"),
            ("lote4", "Fertilizante Y", "Distribuição", "Distribuidora A", "Entregue"),
            ("lote5", "Fertilizante Y", "Venda", "Supermercado A", "Vendido"),
            ("lote6", "Fertilizante Y", "Venda", "Supermercado B", "Vendido"),
        ]
        .into_iter()
        .map(|(id, inputs_used, kind, owner, status)| Asset {
            id: id.to_string(),
            inputs_used: inputs_used.to_string(),
            kind: kind.to_string(),
            start_date: "22/03/2023".to_string(),
            end_date: "22/04/2023".to_string(),
            owner: owner.to_string(),
            status: status.to_string(),
        })
        .collect()
    }
}
